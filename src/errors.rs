//! Error taxonomy: widget capability failures abort a patch walk, everything
//! else is reported without panicking.

use thiserror::Error;

/// Failure raised by a widget's own `update` capability.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct WidgetError(pub String);

impl WidgetError {
    pub fn new(details: impl Into<String>) -> Self {
        WidgetError(details.into())
    }
}

/// Errors surfaced by `patch`. A failed walk leaves the live tree in a
/// possibly partially patched state; it is never retried automatically.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("widget update failed for '{kind}': {source}")]
    WidgetUpdate {
        kind: String,
        #[source]
        source: WidgetError,
    },
}

//! Virtual-tree reconciliation: immutable node trees, minimal ordered diffs,
//! and in-place patching of a live tree.
//!
//! The flow is always `diff(old, new)` producing a [`PatchSet`], then
//! [`patch`] replaying it against the live tree materialized from `old`
//! (via [`create_node`]).

mod apply_props;
mod create;
mod diff_engine;
mod dom;
mod errors;
mod indexer;
mod patcher;
mod types;

pub use apply_props::{apply_properties, patch_properties};
pub use create::{CreateOptions, WarnFn, create_node};
pub use diff_engine::diff;
pub use dom::{Document, LiveKind, LiveNode};
pub use errors::{PatchError, WidgetError};
pub use indexer::tree_index;
pub use patcher::{PatchOptions, patch, patch_with_options};
pub use types::{
    Hook, MoveInsert, MoveRemove, Moves, PatchKind, PatchOp, PatchSet, PropEdit, PropertyValue,
    PropsDelta, Render, VComment, VElement, VNode, VProperties, VText, VThunk, Widget,
};

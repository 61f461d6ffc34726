//! Node construction: materialize a virtual tree into a live tree.

use crate::apply_props::apply_properties;
use crate::dom::{Document, LiveNode};
use crate::types::{VNode, handle_thunk};
use once_cell::sync::Lazy;

/// The document used when none is supplied. Kept out of the core paths:
/// every entry point takes an explicit document via its options.
pub(crate) static DEFAULT_DOCUMENT: Lazy<Document> = Lazy::new(Document::new);

/// Callback invoked instead of failing when a position cannot be
/// materialized.
pub type WarnFn<'a> = dyn Fn(&str, &VNode) + 'a;

pub struct CreateOptions<'a> {
    pub document: &'a Document,
    pub warn: Option<&'a WarnFn<'a>>,
}

impl Default for CreateOptions<'_> {
    fn default() -> Self {
        CreateOptions {
            document: &DEFAULT_DOCUMENT,
            warn: None,
        }
    }
}

/// Construct a live node for `vnode`.
///
/// A malformed position (a thunk chain that never produces a concrete node)
/// is reported through `warn` and yields `None`; the parent simply omits it
/// from its live children.
pub fn create_node(vnode: &VNode, opts: &CreateOptions<'_>) -> Option<LiveNode> {
    let Some(resolved) = handle_thunk(vnode, None) else {
        match opts.warn {
            Some(warn) => warn("thunk chain never produced a concrete node", vnode),
            None => log::warn!("thunk chain never produced a concrete node: {vnode:?}"),
        }
        return None;
    };

    match &resolved {
        VNode::Widget(widget) => Some(widget.init()),
        VNode::Text(text) => Some(opts.document.create_text(&text.text)),
        VNode::Comment(comment) => {
            let node = opts.document.create_comment(&comment.comment);
            // Hooks only; comments carry no attributes.
            apply_properties(&node, &comment.properties);
            Some(node)
        }
        VNode::Element(element) => {
            let node = opts
                .document
                .create_element(&element.tag().to_ascii_lowercase(), element.namespace());
            apply_properties(&node, element.properties());
            for child in element.children() {
                if let Some(child_node) = create_node(child, opts) {
                    node.append_child(child_node);
                }
            }
            Some(node)
        }
        // handle_thunk never returns a thunk.
        VNode::Thunk(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PropertyValue, Render, VProperties};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn materializes_elements_text_and_comments() {
        let mut props = VProperties::new();
        props.insert("class".to_string(), PropertyValue::from("box"));
        let tree = VNode::element(
            "DIV",
            props,
            vec![VNode::text("hello"), VNode::comment("marker")],
        );

        let node = create_node(&tree, &CreateOptions::default()).unwrap();
        assert_eq!(node.tag().as_deref(), Some("div"));
        assert_eq!(
            node.property("class").and_then(|v| v.as_scalar().cloned()),
            Some(serde_json::Value::from("box"))
        );
        assert_eq!(node.child_count(), 2);
        assert_eq!(node.child(0).and_then(|c| c.data()), Some("hello".into()));
        assert!(node.child(1).map(|c| c.is_comment()).unwrap_or(false));
    }

    #[test]
    fn namespaced_elements_lowercase_their_tag_too() {
        use crate::types::VElement;

        let tree = VNode::Element(VElement::new(
            "SVG",
            VProperties::new(),
            vec![],
            None,
            Some("http://www.w3.org/2000/svg".to_string()),
        ));
        let node = create_node(&tree, &CreateOptions::default()).unwrap();
        assert_eq!(node.tag().as_deref(), Some("svg"));
        assert_eq!(
            node.namespace().as_deref(),
            Some("http://www.w3.org/2000/svg")
        );
    }

    #[test]
    fn unresolvable_thunk_warns_and_is_omitted() {
        struct ToThunk;
        impl Render for ToThunk {
            fn render(&self, _previous: Option<&VNode>) -> VNode {
                VNode::thunk(ToThunk)
            }
        }

        let warned = Rc::new(Cell::new(false));
        let warned_in_cb = warned.clone();
        let warn = move |_message: &str, _node: &VNode| warned_in_cb.set(true);

        let tree = VNode::element(
            "div",
            VProperties::new(),
            vec![VNode::text("kept"), VNode::thunk(ToThunk)],
        );
        let opts = CreateOptions {
            warn: Some(&warn),
            ..CreateOptions::default()
        };
        let node = create_node(&tree, &opts).unwrap();
        assert!(warned.get());
        assert_eq!(node.child_count(), 1);
    }

    #[test]
    fn thunks_materialize_through_their_rendering() {
        struct ToText;
        impl Render for ToText {
            fn render(&self, _previous: Option<&VNode>) -> VNode {
                VNode::text("deferred")
            }
        }

        let node = create_node(&VNode::thunk(ToText), &CreateOptions::default()).unwrap();
        assert_eq!(node.data(), Some("deferred".into()));
    }
}

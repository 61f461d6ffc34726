//! The live tree: mutable, shared nodes that the patcher splices in place.
//!
//! Virtual trees are read-only values; this is the other half of the model,
//! a document-like structure with parent links and positional child access.

use crate::types::{PropertyValue, next_id};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Node factory. Process-wide default state is avoided: callers inject a
/// `Document` (or rely on the call-site default in the option structs).
#[derive(Debug, Default)]
pub struct Document {
    _private: (),
}

impl Document {
    pub fn new() -> Self {
        Document { _private: () }
    }

    pub fn create_element(&self, tag: &str, namespace: Option<&str>) -> LiveNode {
        LiveNode::new(LiveKind::Element {
            tag: tag.to_string(),
            namespace: namespace.map(str::to_string),
        })
    }

    pub fn create_text(&self, text: &str) -> LiveNode {
        LiveNode::new(LiveKind::Text(text.to_string()))
    }

    pub fn create_comment(&self, comment: &str) -> LiveNode {
        LiveNode::new(LiveKind::Comment(comment.to_string()))
    }
}

/// What a live node is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveKind {
    Element {
        tag: String,
        namespace: Option<String>,
    },
    Text(String),
    Comment(String),
}

struct LiveInner {
    id: usize,
    kind: LiveKind,
    properties: IndexMap<String, PropertyValue>,
    children: Vec<LiveNode>,
    parent: Option<Weak<RefCell<LiveInner>>>,
}

/// Shared handle to one live node. Clones alias the same node.
#[derive(Clone)]
pub struct LiveNode {
    inner: Rc<RefCell<LiveInner>>,
}

impl LiveNode {
    fn new(kind: LiveKind) -> Self {
        LiveNode {
            inner: Rc::new(RefCell::new(LiveInner {
                id: next_id(),
                kind,
                properties: IndexMap::new(),
                children: Vec::new(),
                parent: None,
            })),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.borrow().id
    }

    pub fn kind(&self) -> LiveKind {
        self.inner.borrow().kind.clone()
    }

    pub fn tag(&self) -> Option<String> {
        match &self.inner.borrow().kind {
            LiveKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<String> {
        match &self.inner.borrow().kind {
            LiveKind::Element { namespace, .. } => namespace.clone(),
            _ => None,
        }
    }

    /// Text or comment payload.
    pub fn data(&self) -> Option<String> {
        match &self.inner.borrow().kind {
            LiveKind::Text(data) | LiveKind::Comment(data) => Some(data.clone()),
            LiveKind::Element { .. } => None,
        }
    }

    /// Set the text or comment payload. Ignored (with a log line) on
    /// elements; only the differ/patcher pairing addresses these nodes.
    pub fn set_data(&self, data: &str) {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.kind {
            LiveKind::Text(existing) | LiveKind::Comment(existing) => {
                *existing = data.to_string();
            }
            LiveKind::Element { tag, .. } => {
                log::warn!("set_data on element <{tag}> ignored");
            }
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.inner.borrow().kind, LiveKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.inner.borrow().kind, LiveKind::Text(_))
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.inner.borrow().kind, LiveKind::Comment(_))
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.inner.borrow().properties.get(name).cloned()
    }

    /// Snapshot of the applied property map.
    pub fn properties(&self) -> IndexMap<String, PropertyValue> {
        self.inner.borrow().properties.clone()
    }

    pub(crate) fn set_property(&self, name: &str, value: PropertyValue) {
        self.inner
            .borrow_mut()
            .properties
            .insert(name.to_string(), value);
    }

    pub(crate) fn remove_property(&self, name: &str) -> Option<PropertyValue> {
        self.inner.borrow_mut().properties.shift_remove(name)
    }

    /// Merge a per-key style delta into the style property `name`.
    pub(crate) fn patch_style(&self, name: &str, delta: &IndexMap<String, Option<String>>) {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .properties
            .entry(name.to_string())
            .or_insert_with(|| PropertyValue::Style(IndexMap::new()));
        if !matches!(entry, PropertyValue::Style(_)) {
            *entry = PropertyValue::Style(IndexMap::new());
        }
        let PropertyValue::Style(style) = entry else {
            return;
        };
        for (key, value) in delta {
            match value {
                Some(value) => {
                    style.insert(key.clone(), value.clone());
                }
                None => {
                    style.shift_remove(key);
                }
            }
        }
    }

    pub fn child_count(&self) -> usize {
        self.inner.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<LiveNode> {
        self.inner.borrow().children.get(index).cloned()
    }

    /// Handles to all children, in order.
    pub fn children(&self) -> Vec<LiveNode> {
        self.inner.borrow().children.clone()
    }

    pub fn parent(&self) -> Option<LiveNode> {
        self.inner
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| LiveNode { inner })
    }

    pub fn append_child(&self, child: LiveNode) {
        child.detach();
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
        self.inner.borrow_mut().children.push(child);
    }

    /// Insert before the child at `index`; past-the-end appends.
    pub fn insert_child(&self, index: usize, child: LiveNode) {
        child.detach();
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
        let mut inner = self.inner.borrow_mut();
        let index = index.min(inner.children.len());
        inner.children.insert(index, child);
    }

    pub fn remove_child_at(&self, index: usize) -> Option<LiveNode> {
        let mut inner = self.inner.borrow_mut();
        if index >= inner.children.len() {
            return None;
        }
        let child = inner.children.remove(index);
        drop(inner);
        child.inner.borrow_mut().parent = None;
        Some(child)
    }

    /// Remove this node from its parent. Returns false when detached already.
    pub fn detach(&self) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        let mut inner = parent.inner.borrow_mut();
        let Some(position) = inner
            .children
            .iter()
            .position(|child| Rc::ptr_eq(&child.inner, &self.inner))
        else {
            return false;
        };
        inner.children.remove(position);
        drop(inner);
        self.inner.borrow_mut().parent = None;
        true
    }

    /// Splice `new` into this node's place. Returns false when this node has
    /// no parent (it is a root); the caller then adopts `new` as the root.
    pub fn replace_with(&self, new: &LiveNode) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        new.detach();
        let mut inner = parent.inner.borrow_mut();
        let Some(position) = inner
            .children
            .iter()
            .position(|child| Rc::ptr_eq(&child.inner, &self.inner))
        else {
            return false;
        };
        inner.children[position] = new.clone();
        drop(inner);
        new.inner.borrow_mut().parent = Some(Rc::downgrade(&parent.inner));
        self.inner.borrow_mut().parent = None;
        true
    }

    pub fn ptr_eq(a: &LiveNode, b: &LiveNode) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for LiveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        match &inner.kind {
            LiveKind::Element { tag, .. } => {
                write!(f, "<{tag} #{} children={}>", inner.id, inner.children.len())
            }
            LiveKind::Text(data) => write!(f, "#text({data:?})"),
            LiveKind::Comment(data) => write!(f, "#comment({data:?})"),
        }
    }
}

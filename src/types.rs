//! Virtual node model, capability traits, and patch types.

use crate::dom::LiveNode;
use crate::errors::WidgetError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered property map of an element (or the hook-only map of a comment).
pub type VProperties = IndexMap<String, PropertyValue>;

/// A single property value.
///
/// Scalars (strings, numbers, booleans) compare by value, style maps compare
/// per entry, hooks compare by identity only.
#[derive(Clone)]
pub enum PropertyValue {
    Scalar(serde_json::Value),
    Style(IndexMap<String, String>),
    Hook(Rc<dyn Hook>),
}

impl PropertyValue {
    pub fn is_hook(&self) -> bool {
        matches!(self, PropertyValue::Hook(_))
    }

    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            PropertyValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_style(&self) -> Option<&IndexMap<String, String>> {
        match self {
            PropertyValue::Style(style) => Some(style),
            _ => None,
        }
    }

    pub fn as_hook(&self) -> Option<&Rc<dyn Hook>> {
        match self {
            PropertyValue::Hook(hook) => Some(hook),
            _ => None,
        }
    }

    /// Identity comparison for hooks: same allocation, not same behavior.
    pub(crate) fn same_hook(a: &Rc<dyn Hook>, b: &Rc<dyn Hook>) -> bool {
        Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Scalar(a), PropertyValue::Scalar(b)) => a == b,
            (PropertyValue::Style(a), PropertyValue::Style(b)) => a == b,
            (PropertyValue::Hook(a), PropertyValue::Hook(b)) => Self::same_hook(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Scalar(value) => write!(f, "Scalar({value})"),
            PropertyValue::Style(style) => write!(f, "Style({style:?})"),
            PropertyValue::Hook(_) => write!(f, "Hook(<capability>)"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(serde_json::Value::from(value))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(serde_json::Value::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(serde_json::Value::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(serde_json::Value::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(serde_json::Value::from(value))
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        PropertyValue::Scalar(value)
    }
}

/// Side-effecting property handler, invoked on attach/detach.
///
/// Hooks are never value-compared; a different hook instance on the same
/// property always unhooks the old one and hooks the new one.
pub trait Hook {
    fn hook(&self, node: &LiveNode, property: &str);
    fn unhook(&self, node: &LiveNode, property: &str);
}

/// Opaque unit with its own init/update/destroy lifecycle, opted out of
/// structural diffing. Two widgets are "the same" when `kind()` matches.
pub trait Widget {
    fn kind(&self) -> &str;

    /// Construct the live node backing this widget.
    fn init(&self) -> LiveNode;

    /// Update in place given the previous widget instance and the existing
    /// live node. Returning `Some(node)` replaces the live node.
    fn update(
        &self,
        previous: &dyn Widget,
        node: &LiveNode,
    ) -> Result<Option<LiveNode>, WidgetError>;

    fn destroy(&self, node: &LiveNode);
}

/// Render capability of a thunk: produce a concrete node, given the node
/// rendered for the previous pass when there was one.
pub trait Render {
    fn render(&self, previous: Option<&VNode>) -> VNode;
}

/// How many chained thunk renders are followed before the position is
/// declared malformed.
pub(crate) const THUNK_RESOLVE_LIMIT: usize = 64;

/// A deferred node. The rendered node is cached so each thunk instance is
/// forced at most once.
pub struct VThunk {
    renderer: Box<dyn Render>,
    rendered: RefCell<Option<VNode>>,
}

impl VThunk {
    pub fn new(renderer: impl Render + 'static) -> Self {
        VThunk {
            renderer: Box::new(renderer),
            rendered: RefCell::new(None),
        }
    }

    /// Force the thunk, rendering on first use and replaying the cache after.
    pub(crate) fn force(&self, previous: Option<&VNode>) -> VNode {
        if let Some(rendered) = self.rendered.borrow().as_ref() {
            return rendered.clone();
        }
        let rendered = self.renderer.render(previous);
        *self.rendered.borrow_mut() = Some(rendered.clone());
        rendered
    }

    /// The cached rendering, if this thunk was forced already.
    pub fn rendered(&self) -> Option<VNode> {
        self.rendered.borrow().clone()
    }
}

impl fmt::Debug for VThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.rendered.borrow() {
            Some(rendered) => write!(f, "VThunk(rendered: {rendered:?})"),
            None => write!(f, "VThunk(pending)"),
        }
    }
}

/// Immutable text node.
#[derive(Clone, Debug, PartialEq)]
pub struct VText {
    pub text: String,
}

/// Immutable comment node. The property map carries hooks only; comments
/// cannot hold attributes.
#[derive(Clone, Debug)]
pub struct VComment {
    pub comment: String,
    pub properties: VProperties,
}

impl VComment {
    pub fn new(comment: impl Into<String>) -> Self {
        VComment {
            comment: comment.into(),
            properties: VProperties::new(),
        }
    }

    pub fn with_properties(comment: impl Into<String>, properties: VProperties) -> Self {
        VComment {
            comment: comment.into(),
            properties,
        }
    }
}

/// Element node. Subtree metadata is computed once at construction; the
/// tree is never mutated afterwards.
#[derive(Clone, Debug)]
pub struct VElement {
    tag: String,
    namespace: Option<String>,
    properties: VProperties,
    children: Vec<VNode>,
    key: Option<String>,
    count: usize,
    has_widgets: bool,
    has_thunks: bool,
    has_hooks: bool,
    has_descendant_hooks: bool,
}

impl VElement {
    pub fn new(
        tag: impl Into<String>,
        properties: VProperties,
        children: Vec<VNode>,
        key: Option<String>,
        namespace: Option<String>,
    ) -> Self {
        let mut count = 1;
        let mut has_widgets = false;
        let mut has_thunks = false;
        let mut has_descendant_hooks = false;

        for child in &children {
            count += child.count();
            match child {
                VNode::Widget(_) => has_widgets = true,
                VNode::Thunk(_) => has_thunks = true,
                VNode::Element(element) => {
                    has_widgets |= element.has_widgets;
                    has_thunks |= element.has_thunks;
                    has_descendant_hooks |= element.has_hooks || element.has_descendant_hooks;
                }
                VNode::Comment(comment) => {
                    has_descendant_hooks |=
                        comment.properties.values().any(PropertyValue::is_hook);
                }
                VNode::Text(_) => {}
            }
        }

        let has_hooks = properties.values().any(PropertyValue::is_hook);

        VElement {
            tag: tag.into(),
            namespace,
            properties,
            children,
            key,
            count,
            has_widgets,
            has_thunks,
            has_hooks,
            has_descendant_hooks,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn properties(&self) -> &VProperties {
        &self.properties
    }

    pub fn children(&self) -> &[VNode] {
        &self.children
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Inclusive subtree size: this node plus all descendants.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn has_widgets(&self) -> bool {
        self.has_widgets
    }

    pub fn has_thunks(&self) -> bool {
        self.has_thunks
    }

    pub fn has_hooks(&self) -> bool {
        self.has_hooks
    }

    pub fn has_descendant_hooks(&self) -> bool {
        self.has_descendant_hooks
    }
}

/// A virtual node: the immutable description of one position in the tree.
#[derive(Clone)]
pub enum VNode {
    Element(VElement),
    Text(VText),
    Comment(VComment),
    Widget(Rc<dyn Widget>),
    Thunk(Rc<VThunk>),
}

impl VNode {
    pub fn element(tag: impl Into<String>, properties: VProperties, children: Vec<VNode>) -> Self {
        VNode::Element(VElement::new(tag, properties, children, None, None))
    }

    pub fn element_keyed(
        tag: impl Into<String>,
        properties: VProperties,
        children: Vec<VNode>,
        key: impl Into<String>,
    ) -> Self {
        VNode::Element(VElement::new(
            tag,
            properties,
            children,
            Some(key.into()),
            None,
        ))
    }

    pub fn text(text: impl Into<String>) -> Self {
        VNode::Text(VText { text: text.into() })
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        VNode::Comment(VComment::new(comment))
    }

    pub fn widget(widget: impl Widget + 'static) -> Self {
        VNode::Widget(Rc::new(widget))
    }

    pub fn thunk(renderer: impl Render + 'static) -> Self {
        VNode::Thunk(Rc::new(VThunk::new(renderer)))
    }

    /// Inclusive subtree size. Widgets and thunks occupy a single traversal
    /// slot even though their contents are opaque.
    pub fn count(&self) -> usize {
        match self {
            VNode::Element(element) => element.count(),
            _ => 1,
        }
    }

    /// Identity key, carried by elements only.
    pub fn key(&self) -> Option<&str> {
        match self {
            VNode::Element(element) => element.key(),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, VNode::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, VNode::Text(_))
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, VNode::Comment(_))
    }

    pub fn is_widget(&self) -> bool {
        matches!(self, VNode::Widget(_))
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, VNode::Thunk(_))
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNode::Element(element) => element.fmt(f),
            VNode::Text(text) => text.fmt(f),
            VNode::Comment(comment) => comment.fmt(f),
            VNode::Widget(widget) => write!(f, "Widget({})", widget.kind()),
            VNode::Thunk(thunk) => thunk.fmt(f),
        }
    }
}

/// Resolve a node to a concrete (non-thunk) node.
///
/// Non-thunks pass through unchanged. A thunk is forced, passing `previous`
/// to the first render in a chain; chains longer than the resolve limit
/// yield `None` (the malformed-node case).
pub fn handle_thunk(node: &VNode, previous: Option<&VNode>) -> Option<VNode> {
    let mut current = node.clone();
    let mut previous = previous.cloned();
    for _ in 0..THUNK_RESOLVE_LIMIT {
        let next = match &current {
            VNode::Thunk(thunk) => thunk.force(previous.take().as_ref()),
            _ => return Some(current),
        };
        current = next;
    }
    None
}

/// Patch discriminant, used for logging and for tests that assert on the
/// shape of a patch list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PatchKind {
    Replace,
    TextReplace,
    Props,
    WidgetUpdate,
    Insert,
    Remove,
    Reorder,
    Thunk,
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchKind::Replace => "REPLACE",
            PatchKind::TextReplace => "TEXT_REPLACE",
            PatchKind::Props => "PROPS",
            PatchKind::WidgetUpdate => "WIDGET_UPDATE",
            PatchKind::Insert => "INSERT",
            PatchKind::Remove => "REMOVE",
            PatchKind::Reorder => "REORDER",
            PatchKind::Thunk => "THUNK",
        };
        f.write_str(name)
    }
}

/// One edit within a property delta.
#[derive(Clone, Debug, PartialEq)]
pub enum PropEdit {
    Set(PropertyValue),
    Remove,
    /// Per-key style change; `None` unsets the style entry.
    Style(IndexMap<String, Option<String>>),
}

/// Property delta: key to edit, in diff-discovery order.
pub type PropsDelta = IndexMap<String, PropEdit>;

/// A child detached during a reorder. Keyed removes are re-inserted by a
/// matching [`MoveInsert`]; unkeyed removes stay detached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MoveRemove {
    pub from: usize,
    pub key: Option<String>,
}

/// A keyed child re-inserted at its final position during a reorder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MoveInsert {
    pub key: String,
    pub to: usize,
}

/// Child index permutation of one parent: removes are applied first, in
/// order, then inserts. Positions are live child positions at each step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Moves {
    pub removes: Vec<MoveRemove>,
    pub inserts: Vec<MoveInsert>,
}

/// One mutation instruction, applied at a traversal index of the old tree.
#[derive(Clone)]
pub enum PatchOp {
    /// Replace the node wholesale with a newly constructed one.
    Replace(VNode),
    /// Set the payload of a text or comment node.
    TextReplace(String),
    /// Apply a property delta. `previous` is the old property map, needed to
    /// unhook replaced or removed hooks.
    Props {
        delta: PropsDelta,
        previous: VProperties,
    },
    /// Hand the live node to the new widget's own update capability.
    WidgetUpdate {
        previous: Rc<dyn Widget>,
        next: Rc<dyn Widget>,
    },
    /// Append a newly constructed child to the node at this index.
    Insert(VNode),
    /// Detach the node at this index; the carried old node drives widget
    /// destroy and hook unhook calls.
    Remove(VNode),
    /// Permute the children of the node at this index.
    Reorder(Moves),
    /// Patches of a thunk's rendering, with their own index space rooted at
    /// the node this thunk materialized into.
    Thunk(PatchSet),
}

impl PatchOp {
    pub fn kind(&self) -> PatchKind {
        match self {
            PatchOp::Replace(_) => PatchKind::Replace,
            PatchOp::TextReplace(_) => PatchKind::TextReplace,
            PatchOp::Props { .. } => PatchKind::Props,
            PatchOp::WidgetUpdate { .. } => PatchKind::WidgetUpdate,
            PatchOp::Insert(_) => PatchKind::Insert,
            PatchOp::Remove(_) => PatchKind::Remove,
            PatchOp::Reorder(_) => PatchKind::Reorder,
            PatchOp::Thunk(_) => PatchKind::Thunk,
        }
    }
}

impl fmt::Debug for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Replace(node) => write!(f, "Replace({node:?})"),
            PatchOp::TextReplace(text) => write!(f, "TextReplace({text:?})"),
            PatchOp::Props { delta, .. } => write!(f, "Props({delta:?})"),
            PatchOp::WidgetUpdate { previous, next } => {
                write!(f, "WidgetUpdate({} -> {})", previous.kind(), next.kind())
            }
            PatchOp::Insert(node) => write!(f, "Insert({node:?})"),
            PatchOp::Remove(node) => write!(f, "Remove({node:?})"),
            PatchOp::Reorder(moves) => write!(f, "Reorder({moves:?})"),
            PatchOp::Thunk(patches) => write!(f, "Thunk({patches:?})"),
        }
    }
}

/// The ordered result of a diff: operations grouped by traversal index of
/// the old tree, in strictly increasing index order. The old tree rides
/// along so the patcher can index the live tree without re-walking it.
#[derive(Clone)]
pub struct PatchSet {
    old: VNode,
    ops: BTreeMap<usize, Vec<PatchOp>>,
}

impl PatchSet {
    pub(crate) fn new(old: VNode, ops: BTreeMap<usize, Vec<PatchOp>>) -> Self {
        PatchSet { old, ops }
    }

    /// The old tree the traversal indices refer to.
    pub fn old_tree(&self) -> &VNode {
        &self.old
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total number of operations across all indices.
    pub fn len(&self) -> usize {
        self.ops.values().map(Vec::len).sum()
    }

    /// Affected traversal indices, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.ops.keys().copied()
    }

    /// All operations, flattened, in application order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PatchOp)> + '_ {
        self.ops
            .iter()
            .flat_map(|(&index, ops)| ops.iter().map(move |op| (index, op)))
    }

    pub(crate) fn grouped(&self) -> impl Iterator<Item = (usize, &[PatchOp])> + '_ {
        self.ops.iter().map(|(&index, ops)| (index, ops.as_slice()))
    }
}

impl fmt::Debug for PatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.ops
                    .iter()
                    .map(|(index, ops)| (index, ops.iter().map(PatchOp::kind).collect::<Vec<_>>())),
            )
            .finish()
    }
}

/// Global live-node id generator (lock-free, atomic).
static ID_COUNTER: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

pub(crate) fn next_id() -> usize {
    ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn element_count_is_one_plus_children() {
        let tree = VNode::element(
            "div",
            VProperties::new(),
            vec![
                VNode::text("a"),
                VNode::element("span", VProperties::new(), vec![VNode::text("b")]),
            ],
        );
        assert_eq!(tree.count(), 4);
    }

    #[test]
    fn widget_and_thunk_metadata_bubbles_up() {
        struct Noop;
        impl Widget for Noop {
            fn kind(&self) -> &str {
                "noop"
            }
            fn init(&self) -> LiveNode {
                crate::dom::Document::new().create_text("")
            }
            fn update(
                &self,
                _previous: &dyn Widget,
                _node: &LiveNode,
            ) -> Result<Option<LiveNode>, WidgetError> {
                Ok(None)
            }
            fn destroy(&self, _node: &LiveNode) {}
        }

        let inner = VNode::element("span", VProperties::new(), vec![VNode::widget(Noop)]);
        let tree = VElement::new("div", VProperties::new(), vec![inner], None, None);
        assert!(tree.has_widgets());
        assert!(!tree.has_thunks());
        assert_eq!(tree.count(), 3);
    }

    #[test]
    fn thunk_renders_once_and_caches() {
        struct Counted(Rc<Cell<usize>>);
        impl Render for Counted {
            fn render(&self, _previous: Option<&VNode>) -> VNode {
                self.0.set(self.0.get() + 1);
                VNode::text("rendered")
            }
        }

        let calls = Rc::new(Cell::new(0));
        let thunk = Rc::new(VThunk::new(Counted(calls.clone())));
        let first = thunk.force(None);
        let second = thunk.force(None);
        assert_eq!(calls.get(), 1);
        assert!(matches!(first, VNode::Text(ref t) if t.text == "rendered"));
        assert!(matches!(second, VNode::Text(ref t) if t.text == "rendered"));
    }

    #[test]
    fn thunk_chains_resolve_and_runaway_chains_fail() {
        struct ToText;
        impl Render for ToText {
            fn render(&self, _previous: Option<&VNode>) -> VNode {
                VNode::text("leaf")
            }
        }
        struct ToThunk;
        impl Render for ToThunk {
            fn render(&self, _previous: Option<&VNode>) -> VNode {
                VNode::thunk(ToThunk)
            }
        }

        let chained = VNode::thunk(ToText);
        let resolved = handle_thunk(&chained, None);
        assert!(matches!(resolved, Some(VNode::Text(ref t)) if t.text == "leaf"));

        let runaway = VNode::thunk(ToThunk);
        assert!(handle_thunk(&runaway, None).is_none());
    }

    #[test]
    fn hooks_compare_by_identity() {
        struct Quiet;
        impl Hook for Quiet {
            fn hook(&self, _node: &LiveNode, _property: &str) {}
            fn unhook(&self, _node: &LiveNode, _property: &str) {}
        }

        let shared: Rc<dyn Hook> = Rc::new(Quiet);
        let a = PropertyValue::Hook(shared.clone());
        let b = PropertyValue::Hook(shared);
        let c = PropertyValue::Hook(Rc::new(Quiet));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

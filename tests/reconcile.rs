//! End-to-end reconciliation over the public API: materialize, diff, patch.

use std::cell::RefCell;
use std::rc::Rc;
use vtree::{
    CreateOptions, Document, Hook, LiveNode, PatchKind, PropertyValue, Render, VNode, VProperties,
    Widget, WidgetError, create_node, diff, patch,
};

fn materialize(tree: &VNode) -> LiveNode {
    create_node(tree, &CreateOptions::default()).expect("tree should materialize")
}

fn shape(node: &LiveNode) -> String {
    if let Some(tag) = node.tag() {
        let mut props: Vec<String> = node
            .properties()
            .iter()
            .map(|(name, value)| format!("{name}={value:?}"))
            .collect();
        props.sort();
        let children: Vec<String> = node.children().iter().map(shape).collect();
        format!("<{tag} {}>[{}]", props.join(" "), children.join(","))
    } else if node.is_comment() {
        format!("<!--{}-->", node.data().unwrap_or_default())
    } else {
        node.data().unwrap_or_default()
    }
}

fn props(pairs: &[(&str, &str)]) -> VProperties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
        .collect()
}

#[test]
fn identical_trees_yield_no_patches_and_an_unchanged_root() {
    let make = || {
        VNode::element(
            "div",
            props(&[("class", "panel")]),
            vec![
                VNode::text("hello"),
                VNode::element("span", props(&[("id", "s")]), vec![VNode::text("world")]),
                VNode::comment("boundary"),
            ],
        )
    };

    let patches = diff(&make(), &make());
    assert!(patches.is_empty());

    let root = materialize(&make());
    let before = shape(&root);
    let root = patch(root, &patches).unwrap();
    assert_eq!(shape(&root), before);
}

#[test]
fn patching_converges_on_the_target_tree() {
    let old = VNode::element(
        "div",
        props(&[("class", "old"), ("title", "stale")]),
        vec![
            VNode::text("alpha"),
            VNode::element(
                "ul",
                VProperties::new(),
                vec![
                    VNode::element("li", VProperties::new(), vec![VNode::text("one")]),
                    VNode::element("li", VProperties::new(), vec![VNode::text("two")]),
                ],
            ),
        ],
    );
    let new = VNode::element(
        "div",
        props(&[("class", "new"), ("lang", "en")]),
        vec![
            VNode::text("beta"),
            VNode::element(
                "ul",
                VProperties::new(),
                vec![
                    VNode::element("li", VProperties::new(), vec![VNode::text("one")]),
                    VNode::element("li", VProperties::new(), vec![VNode::text("2")]),
                    VNode::element("li", VProperties::new(), vec![VNode::text("three")]),
                ],
            ),
            VNode::comment("trailer"),
        ],
    );

    let root = patch(materialize(&old), &diff(&old, &new)).unwrap();
    assert_eq!(shape(&root), shape(&materialize(&new)));
}

#[test]
fn keyed_reorder_preserves_node_identity() {
    let item = |key: &str| VNode::element_keyed("li", VProperties::new(), vec![VNode::text(key)], key);
    let old = VNode::element(
        "ul",
        VProperties::new(),
        vec![item("a"), item("b"), item("c"), item("d")],
    );
    let new = VNode::element(
        "ul",
        VProperties::new(),
        vec![item("d"), item("b"), item("a"), item("c")],
    );

    let patches = diff(&old, &new);
    // a pure permutation: no inserts, no removes, no replaces
    assert!(
        patches
            .iter()
            .all(|(_, op)| op.kind() == PatchKind::Reorder)
    );

    let root = materialize(&old);
    let mut before: Vec<usize> = root.children().iter().map(LiveNode::id).collect();
    let root = patch(root, &patches).unwrap();
    let after: Vec<usize> = root.children().iter().map(LiveNode::id).collect();

    assert_eq!(shape(&root), shape(&materialize(&new)));
    before.sort_unstable();
    let mut moved = after.clone();
    moved.sort_unstable();
    assert_eq!(before, moved);
}

#[test]
fn property_deltas_are_minimal() {
    let old = VNode::element("div", props(&[("class", "a"), ("id", "x"), ("lang", "en")]), vec![]);
    let new = VNode::element("div", props(&[("class", "b"), ("id", "x"), ("lang", "en")]), vec![]);

    let patches = diff(&old, &new);
    assert_eq!(patches.len(), 1);
    assert_eq!(
        patches.iter().map(|(_, op)| op.kind()).collect::<Vec<_>>(),
        [PatchKind::Props]
    );

    let root = patch(materialize(&old), &diff(&old, &new)).unwrap();
    assert_eq!(
        root.property("class").and_then(|v| v.as_scalar().cloned()),
        Some(serde_json::Value::from("b"))
    );
    assert_eq!(
        root.property("id").and_then(|v| v.as_scalar().cloned()),
        Some(serde_json::Value::from("x"))
    );
}

struct Lifecycle {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl Widget for Lifecycle {
    fn kind(&self) -> &str {
        "lifecycle"
    }
    fn init(&self) -> LiveNode {
        self.log.borrow_mut().push(format!("init {}", self.name));
        Document::new().create_text(self.name)
    }
    fn update(
        &self,
        _previous: &dyn Widget,
        _node: &LiveNode,
    ) -> Result<Option<LiveNode>, WidgetError> {
        self.log.borrow_mut().push(format!("update {}", self.name));
        Ok(None)
    }
    fn destroy(&self, _node: &LiveNode) {
        self.log.borrow_mut().push(format!("destroy {}", self.name));
    }
}

#[test]
fn widget_lifecycle_runs_init_update_destroy() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let widget = |name| {
        VNode::widget(Lifecycle {
            name,
            log: log.clone(),
        })
    };

    let empty = VNode::element("div", VProperties::new(), vec![]);
    let with_first = VNode::element("div", VProperties::new(), vec![widget("w")]);
    let with_second = VNode::element("div", VProperties::new(), vec![widget("w")]);

    let root = materialize(&empty);
    let root = patch(root, &diff(&empty, &with_first)).unwrap();
    let root = patch(root, &diff(&with_first, &with_second)).unwrap();
    let root = patch(root, &diff(&with_second, &empty)).unwrap();

    assert_eq!(*log.borrow(), ["init w", "update w", "destroy w"]);
    assert_eq!(root.child_count(), 0);
}

struct Focus {
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Hook for Focus {
    fn hook(&self, _node: &LiveNode, _property: &str) {
        self.log.borrow_mut().push("hook");
    }
    fn unhook(&self, _node: &LiveNode, _property: &str) {
        self.log.borrow_mut().push("unhook");
    }
}

#[test]
fn hooks_attach_on_create_and_detach_on_removal() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut hooked = VProperties::new();
    hooked.insert(
        "autofocus".to_string(),
        PropertyValue::Hook(Rc::new(Focus { log: log.clone() })),
    );

    let old = VNode::element(
        "form",
        VProperties::new(),
        vec![VNode::element("input", hooked, vec![])],
    );
    let new = VNode::element("form", VProperties::new(), vec![]);

    let root = materialize(&old);
    assert_eq!(*log.borrow(), ["hook"]);
    patch(root, &diff(&old, &new)).unwrap();
    assert_eq!(*log.borrow(), ["hook", "unhook"]);
}

struct Counter {
    value: usize,
}

impl Render for Counter {
    fn render(&self, _previous: Option<&VNode>) -> VNode {
        VNode::element(
            "span",
            VProperties::new(),
            vec![VNode::text(self.value.to_string())],
        )
    }
}

#[test]
fn thunk_rerenders_diff_through_to_the_text() {
    let old = VNode::element(
        "div",
        VProperties::new(),
        vec![VNode::thunk(Counter { value: 1 })],
    );
    let new = VNode::element(
        "div",
        VProperties::new(),
        vec![VNode::thunk(Counter { value: 2 })],
    );

    let patches = diff(&old, &new);
    // the re-render nests under the thunk's slot; the span survives
    assert_eq!(
        patches.iter().map(|(_, op)| op.kind()).collect::<Vec<_>>(),
        [PatchKind::Thunk]
    );

    let root = materialize(&old);
    let span = root.child(0).unwrap();
    let root = patch(root, &patches).unwrap();
    assert!(LiveNode::ptr_eq(&span, &root.child(0).unwrap()));
    assert_eq!(span.child(0).and_then(|t| t.data()), Some("2".into()));
}

#[test]
fn root_replacement_hands_back_a_new_root() {
    let old = VNode::text("loose text");
    let new = VNode::element("main", VProperties::new(), vec![VNode::text("mounted")]);

    let old_root = materialize(&old);
    let root = patch(old_root.clone(), &diff(&old, &new)).unwrap();
    assert!(!LiveNode::ptr_eq(&root, &old_root));
    assert_eq!(root.tag().as_deref(), Some("main"));
}

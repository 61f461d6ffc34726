//! Core diffing engine: walk two trees of matching position and emit a
//! patch list ordered by traversal index of the old tree.

use crate::types::{
    MoveInsert, MoveRemove, Moves, PatchOp, PatchSet, PropEdit, PropertyValue, PropsDelta,
    VElement, VNode, VProperties, Widget, handle_thunk,
};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Diff `old` against `new`, producing the ordered patch list that turns a
/// live tree materialized from `old` into one matching `new`.
pub fn diff(old: &VNode, new: &VNode) -> PatchSet {
    let mut engine = DiffEngine::default();
    engine.walk(old, Some(new), 0);
    log::debug!(
        "DiffEngine: {} op(s) across {} index(es)",
        engine.ops.values().map(Vec::len).sum::<usize>(),
        engine.ops.len()
    );
    PatchSet::new(old.clone(), engine.ops)
}

#[derive(Default)]
struct DiffEngine {
    ops: BTreeMap<usize, Vec<PatchOp>>,
}

impl DiffEngine {
    fn emit(&mut self, index: usize, op: PatchOp) {
        log::trace!("DiffEngine: {} at index {index}", op.kind());
        self.ops.entry(index).or_default().push(op);
    }

    fn walk(&mut self, a: &VNode, b: Option<&VNode>, index: usize) {
        let Some(b) = b else {
            self.emit(index, PatchOp::Remove(a.clone()));
            return;
        };

        // Thunks compare only after rendering, in their own index space: a
        // thunk occupies one slot of the enclosing tree, so its rendering's
        // patches nest instead of flattening into the outer indices.
        if a.is_thunk() || b.is_thunk() {
            self.diff_thunk(a, b, index);
            return;
        }

        match (a, b) {
            (VNode::Element(ea), VNode::Element(eb))
                if ea.tag() == eb.tag()
                    && ea.namespace() == eb.namespace()
                    && ea.key() == eb.key() =>
            {
                if let Some(delta) = diff_props(ea.properties(), eb.properties()) {
                    self.emit(
                        index,
                        PatchOp::Props {
                            delta,
                            previous: ea.properties().clone(),
                        },
                    );
                }
                self.diff_children(ea, eb, index);
            }
            (VNode::Text(ta), VNode::Text(tb)) => {
                if ta.text != tb.text {
                    self.emit(index, PatchOp::TextReplace(tb.text.clone()));
                }
            }
            (VNode::Comment(ca), VNode::Comment(cb)) => {
                if ca.comment != cb.comment {
                    self.emit(index, PatchOp::TextReplace(cb.comment.clone()));
                }
                // Comments have no attributes: only hook changes apply.
                if let Some(delta) = diff_props(&ca.properties, &cb.properties) {
                    let delta = hook_edits_only(delta, &ca.properties);
                    if !delta.is_empty() {
                        self.emit(
                            index,
                            PatchOp::Props {
                                delta,
                                previous: ca.properties.clone(),
                            },
                        );
                    }
                }
            }
            (VNode::Widget(wa), VNode::Widget(wb)) if wa.kind() == wb.kind() => {
                if !same_widget(wa, wb) {
                    self.emit(
                        index,
                        PatchOp::WidgetUpdate {
                            previous: wa.clone(),
                            next: wb.clone(),
                        },
                    );
                }
            }
            // Variant, tag, namespace, or key mismatch: replace wholesale,
            // never recurse. The patcher disposes the detached subtree.
            _ => {
                self.emit(index, PatchOp::Replace(b.clone()));
            }
        }
    }

    fn diff_thunk(&mut self, a: &VNode, b: &VNode, index: usize) {
        // The new side's thunk receives the old node as its previous
        // rendering; the old side's was forced at materialization time.
        let resolved_b = resolve_or_placeholder(b, Some(a));
        let resolved_a = resolve_or_placeholder(a, None);
        let nested = diff(&resolved_a, &resolved_b);
        if nested.is_empty() {
            return;
        }
        // A rendering whose changes all land on its own root shares that
        // node with the outer slot, so those ops flatten straight in.
        if nested.indices().all(|nested_index| nested_index == 0) {
            for (_, op) in nested.iter() {
                self.emit(index, op.clone());
            }
        } else {
            self.emit(index, PatchOp::Thunk(nested));
        }
    }

    fn diff_children(&mut self, a: &VElement, b: &VElement, index: usize) {
        let ordered = reorder(a.children(), b.children());
        let len = a.children().len().max(ordered.children.len());

        let mut cursor = index + 1;
        for position in 0..len {
            let left = a.children().get(position);
            let right = ordered.children.get(position).and_then(Option::as_ref);
            match left {
                Some(left) => {
                    self.walk(left, right, cursor);
                    cursor += left.count();
                }
                None => {
                    // Fresh child: appended at the parent, then put into
                    // place by the reorder below if one is pending.
                    if let Some(right) = right {
                        self.emit(index, PatchOp::Insert(right.clone()));
                    }
                }
            }
        }

        if let Some(moves) = ordered.moves {
            self.emit(index, PatchOp::Reorder(moves));
        }
    }
}

fn resolve_or_placeholder(node: &VNode, previous: Option<&VNode>) -> VNode {
    match handle_thunk(node, previous) {
        Some(resolved) => resolved,
        None => {
            log::error!("thunk chain never produced a concrete node; diffing an empty text node");
            VNode::text("")
        }
    }
}

fn same_widget(a: &Rc<dyn Widget>, b: &Rc<dyn Widget>) -> bool {
    Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

/// Diff two property maps into a delta; `None` when nothing changed.
///
/// Scalars compare by value. Style maps get a per-key diff. Hooks compare by
/// identity only: a different hook instance is always re-set so it can
/// unhook/hook its side effects.
pub(crate) fn diff_props(a: &VProperties, b: &VProperties) -> Option<PropsDelta> {
    let mut delta = PropsDelta::new();

    for (key, a_value) in a {
        match b.get(key) {
            None => {
                delta.insert(key.clone(), PropEdit::Remove);
            }
            Some(b_value) => match (a_value, b_value) {
                (PropertyValue::Hook(a_hook), PropertyValue::Hook(b_hook)) => {
                    if !PropertyValue::same_hook(a_hook, b_hook) {
                        delta.insert(key.clone(), PropEdit::Set(b_value.clone()));
                    }
                }
                (PropertyValue::Style(a_style), PropertyValue::Style(b_style)) => {
                    if a_style != b_style {
                        delta.insert(key.clone(), PropEdit::Style(diff_style(a_style, b_style)));
                    }
                }
                (PropertyValue::Scalar(a_scalar), PropertyValue::Scalar(b_scalar)) => {
                    if a_scalar != b_scalar {
                        delta.insert(key.clone(), PropEdit::Set(b_value.clone()));
                    }
                }
                _ => {
                    delta.insert(key.clone(), PropEdit::Set(b_value.clone()));
                }
            },
        }
    }

    for (key, b_value) in b {
        if !a.contains_key(key) {
            delta.insert(key.clone(), PropEdit::Set(b_value.clone()));
        }
    }

    if delta.is_empty() { None } else { Some(delta) }
}

fn diff_style(
    a: &IndexMap<String, String>,
    b: &IndexMap<String, String>,
) -> IndexMap<String, Option<String>> {
    let mut style = IndexMap::new();
    for key in a.keys() {
        if !b.contains_key(key) {
            style.insert(key.clone(), None);
        }
    }
    for (key, value) in b {
        if a.get(key) != Some(value) {
            style.insert(key.clone(), Some(value.clone()));
        }
    }
    style
}

fn hook_edits_only(delta: PropsDelta, previous: &VProperties) -> PropsDelta {
    delta
        .into_iter()
        .filter(|(key, edit)| {
            matches!(edit, PropEdit::Set(PropertyValue::Hook(_)))
                || previous.get(key).is_some_and(PropertyValue::is_hook)
        })
        .collect()
}

struct OrderedSet {
    /// New children aligned with the old child positions; `None` marks an
    /// old slot with no counterpart. Fresh children are appended at the end.
    children: Vec<Option<VNode>>,
    moves: Option<Moves>,
}

struct KeyIndex<'a> {
    keys: HashMap<&'a str, usize>,
    free: Vec<usize>,
}

fn key_index(children: &[VNode]) -> KeyIndex<'_> {
    let mut keys = HashMap::new();
    let mut free = Vec::new();
    for (position, child) in children.iter().enumerate() {
        match child.key() {
            Some(key) => {
                keys.insert(key, position);
            }
            None => free.push(position),
        }
    }
    KeyIndex { keys, free }
}

/// Align `b` against the positions of `a` using identity keys, and derive
/// the remove/insert move pairs that permute the live children into `b`
/// order. With no keys on either side the children pass through unchanged.
fn reorder(a: &[VNode], b: &[VNode]) -> OrderedSet {
    let b_index = key_index(b);
    if b_index.free.len() == b.len() {
        return OrderedSet {
            children: b.iter().cloned().map(Some).collect(),
            moves: None,
        };
    }
    let a_index = key_index(a);
    if a_index.free.len() == a.len() {
        return OrderedSet {
            children: b.iter().cloned().map(Some).collect(),
            moves: None,
        };
    }

    // Matched keys keep their old slot; unkeyed children consume the new
    // side's unkeyed slots in original relative order, never an already
    // consumed key; unmatched old slots become holes.
    let mut new_children: Vec<Option<VNode>> = Vec::with_capacity(a.len() + b.len());
    let mut free_cursor = 0;
    let mut deleted = 0usize;
    for item in a {
        match item.key() {
            Some(key) => match b_index.keys.get(key) {
                Some(&position) => new_children.push(Some(b[position].clone())),
                None => {
                    deleted += 1;
                    new_children.push(None);
                }
            },
            None => {
                if free_cursor < b_index.free.len() {
                    let position = b_index.free[free_cursor];
                    free_cursor += 1;
                    new_children.push(Some(b[position].clone()));
                } else {
                    deleted += 1;
                    new_children.push(None);
                }
            }
        }
    }
    let last_free = b_index.free.get(free_cursor).copied().unwrap_or(b.len());

    // Children with no old counterpart: fresh keys plus the unkeyed tail.
    for (position, item) in b.iter().enumerate() {
        match item.key() {
            Some(key) => {
                if !a_index.keys.contains_key(key) {
                    new_children.push(Some(item.clone()));
                }
            }
            None => {
                if position >= last_free {
                    new_children.push(Some(item.clone()));
                }
            }
        }
    }

    // Replay the wanted order against a simulation of the aligned list.
    // Entry encoding: None = hole, Some(None) = unkeyed, Some(Some(key)).
    let mut simulate: Vec<Option<Option<String>>> = new_children
        .iter()
        .map(|child| child.as_ref().map(|node| node.key().map(str::to_string)))
        .collect();
    let mut removes: Vec<MoveRemove> = Vec::new();
    let mut inserts: Vec<MoveInsert> = Vec::new();
    let mut sim_cursor = 0;
    let mut wanted_cursor = 0;

    while wanted_cursor < b.len() {
        let wanted_key = b[wanted_cursor].key().map(str::to_string);

        while matches!(simulate.get(sim_cursor), Some(None)) {
            removes.push(take(&mut simulate, sim_cursor, None));
        }

        let sim_item: Option<Option<String>> =
            simulate.get(sim_cursor).and_then(|entry| entry.clone());

        if sim_item.as_ref() == Some(&wanted_key) {
            sim_cursor += 1;
            wanted_cursor += 1;
            continue;
        }

        match wanted_key {
            Some(wanted_key) => {
                let advanced = match &sim_item {
                    Some(Some(sim_key)) => {
                        // A keyed child is in the way. Leave it put when it
                        // is wanted next; otherwise pull it out for
                        // re-insertion later.
                        if b_index.keys.get(sim_key.as_str()).copied() != Some(wanted_cursor + 1) {
                            removes.push(take(&mut simulate, sim_cursor, Some(sim_key.clone())));
                            let next: Option<Option<String>> =
                                simulate.get(sim_cursor).and_then(|entry| entry.clone());
                            if next == Some(Some(wanted_key.clone())) {
                                true
                            } else {
                                inserts.push(MoveInsert {
                                    key: wanted_key.clone(),
                                    to: wanted_cursor,
                                });
                                false
                            }
                        } else {
                            inserts.push(MoveInsert {
                                key: wanted_key.clone(),
                                to: wanted_cursor,
                            });
                            false
                        }
                    }
                    _ => {
                        inserts.push(MoveInsert {
                            key: wanted_key.clone(),
                            to: wanted_cursor,
                        });
                        false
                    }
                };
                if advanced {
                    sim_cursor += 1;
                }
                wanted_cursor += 1;
            }
            None => {
                if let Some(Some(sim_key)) = &sim_item {
                    // Unkeyed wanted, keyed child in the way.
                    removes.push(take(&mut simulate, sim_cursor, Some(sim_key.clone())));
                } else {
                    // Simulation exhausted while unkeyed children remain:
                    // they are fresh inserts, nothing left to move.
                    wanted_cursor += 1;
                }
            }
        }
    }

    while sim_cursor < simulate.len() {
        let key = simulate[sim_cursor].clone().flatten();
        removes.push(take(&mut simulate, sim_cursor, key));
    }

    // Only hole-flushing removes and no inserts: the removals are already
    // covered by Remove patches, no permutation is needed.
    if removes.len() == deleted && inserts.is_empty() {
        return OrderedSet {
            children: new_children,
            moves: None,
        };
    }

    OrderedSet {
        children: new_children,
        moves: Some(Moves { removes, inserts }),
    }
}

fn take(
    simulate: &mut Vec<Option<Option<String>>>,
    position: usize,
    key: Option<String>,
) -> MoveRemove {
    simulate.remove(position);
    MoveRemove {
        from: position,
        key,
    }
}

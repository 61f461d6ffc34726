//! Patch application: replay an ordered patch list against the live tree it
//! was diffed for, in increasing traversal-index order.

use crate::apply_props::patch_properties;
use crate::create::{CreateOptions, DEFAULT_DOCUMENT, WarnFn, create_node};
use crate::dom::{Document, LiveNode};
use crate::errors::PatchError;
use crate::indexer;
use crate::types::{Moves, PatchOp, PatchSet, PropertyValue, VNode};
use std::collections::HashMap;

pub struct PatchOptions<'a> {
    pub document: &'a Document,
    pub warn: Option<&'a WarnFn<'a>>,
}

impl Default for PatchOptions<'_> {
    fn default() -> Self {
        PatchOptions {
            document: &DEFAULT_DOCUMENT,
            warn: None,
        }
    }
}

/// Apply `patches` to `root` and return the resulting root, which is a new
/// handle only when the root itself was replaced.
///
/// The live tree is mutated in place. On error it is left as patched so far;
/// a failed patch is never retried or rolled back.
pub fn patch(root: LiveNode, patches: &PatchSet) -> Result<LiveNode, PatchError> {
    patch_with_options(root, patches, &PatchOptions::default())
}

pub fn patch_with_options(
    root: LiveNode,
    patches: &PatchSet,
    opts: &PatchOptions<'_>,
) -> Result<LiveNode, PatchError> {
    if patches.is_empty() {
        return Ok(root);
    }

    // Both index maps are built before any mutation: every op addresses the
    // tree as it stood when the diff ran.
    let indices: Vec<usize> = patches.indices().collect();
    let live = indexer::live_index(&root, patches.old_tree(), &indices);
    let old_nodes = indexer::tree_index(patches.old_tree(), &indices);

    let mut root = root;
    for (index, ops) in patches.grouped() {
        let Some(node) = live.get(&index) else {
            log::warn!(
                "no live node at traversal index {index}; skipping {} op(s)",
                ops.len()
            );
            continue;
        };
        for op in ops {
            root = apply_op(root, node, op, old_nodes.get(&index).copied(), opts)?;
        }
    }
    Ok(root)
}

fn apply_op(
    root: LiveNode,
    node: &LiveNode,
    op: &PatchOp,
    old: Option<&VNode>,
    opts: &PatchOptions<'_>,
) -> Result<LiveNode, PatchError> {
    log::trace!("patch: {} on {node:?}", op.kind());
    match op {
        PatchOp::TextReplace(text) => {
            node.set_data(text);
            Ok(root)
        }
        PatchOp::Props { delta, previous } => {
            patch_properties(node, delta, previous);
            Ok(root)
        }
        PatchOp::Insert(vnode) => {
            // Appended at the end; a Reorder op at the same index moves it
            // into place when the child is keyed.
            if let Some(child) = create_node(vnode, &create_options(opts)) {
                node.append_child(child);
            }
            Ok(root)
        }
        PatchOp::Remove(old_vnode) => {
            node.detach();
            dispose_tree(old_vnode, node);
            Ok(root)
        }
        PatchOp::Replace(new_vnode) => {
            let Some(new_node) = create_node(new_vnode, &create_options(opts)) else {
                // Malformed replacement was warned about in create_node;
                // the existing node stays.
                return Ok(root);
            };
            let had_parent = node.replace_with(&new_node);
            if let Some(old) = old {
                dispose_tree(old, node);
            }
            if !had_parent && LiveNode::ptr_eq(node, &root) {
                return Ok(new_node);
            }
            Ok(root)
        }
        PatchOp::WidgetUpdate { previous, next } => {
            let updated = next
                .update(previous.as_ref(), node)
                .map_err(|source| PatchError::WidgetUpdate {
                    kind: next.kind().to_string(),
                    source,
                })?;
            if let Some(new_node) = updated {
                if !LiveNode::ptr_eq(&new_node, node) {
                    let had_parent = node.replace_with(&new_node);
                    if !had_parent && LiveNode::ptr_eq(node, &root) {
                        return Ok(new_node);
                    }
                }
            }
            Ok(root)
        }
        PatchOp::Reorder(moves) => {
            reorder_children(node, moves);
            Ok(root)
        }
        PatchOp::Thunk(nested) => {
            // The thunk's live node is the root of the nested index space.
            let patched = patch_with_options(node.clone(), nested, opts)?;
            if !LiveNode::ptr_eq(&patched, node) && LiveNode::ptr_eq(node, &root) {
                return Ok(patched);
            }
            Ok(root)
        }
    }
}

fn create_options<'a>(opts: &'a PatchOptions<'a>) -> CreateOptions<'a> {
    CreateOptions {
        document: opts.document,
        warn: opts.warn,
    }
}

/// Permute the children of `node`: removes first, in order, then keyed
/// re-inserts. Positions are live child positions at each step.
fn reorder_children(node: &LiveNode, moves: &Moves) {
    let mut keyed: HashMap<&str, LiveNode> = HashMap::new();
    for remove in &moves.removes {
        match node.remove_child_at(remove.from) {
            Some(child) => {
                if let Some(key) = &remove.key {
                    keyed.insert(key.as_str(), child);
                }
            }
            None => {
                log::warn!("reorder remove at {} out of range on {node:?}", remove.from);
            }
        }
    }
    for insert in &moves.inserts {
        match keyed.remove(insert.key.as_str()) {
            Some(child) => node.insert_child(insert.to, child),
            None => {
                log::warn!("reorder insert references unknown key '{}'", insert.key);
            }
        }
    }
}

/// Release a subtree leaving the live tree: unhook hooks and destroy widgets
/// in document order, walking the old virtual tree in lockstep with the
/// detached live nodes. Subtree metadata prunes branches with nothing to do.
fn dispose_tree(vnode: &VNode, live: &LiveNode) {
    match vnode {
        VNode::Widget(widget) => widget.destroy(live),
        VNode::Thunk(thunk) => {
            if let Some(rendered) = thunk.rendered() {
                dispose_tree(&rendered, live);
            }
        }
        VNode::Comment(comment) => {
            for (name, value) in &comment.properties {
                if let PropertyValue::Hook(hook) = value {
                    hook.unhook(live, name);
                }
            }
        }
        VNode::Element(element) => {
            if !element.has_widgets()
                && !element.has_thunks()
                && !element.has_hooks()
                && !element.has_descendant_hooks()
            {
                return;
            }
            for (name, value) in element.properties() {
                if let PropertyValue::Hook(hook) = value {
                    hook.unhook(live, name);
                }
            }
            for (position, child) in element.children().iter().enumerate() {
                match live.child(position) {
                    Some(live_child) => dispose_tree(child, &live_child),
                    None => {
                        log::warn!("live child {position} missing while releasing {live:?}");
                    }
                }
            }
        }
        VNode::Text(_) => {}
    }
}

//! Traversal-index lookup: map pre-order positions (root = 0) to the nodes
//! occupying them, restricted to a sorted set of requested indices so
//! unaffected subtrees are skipped in O(1) using their subtree counts.

use crate::dom::LiveNode;
use crate::types::VNode;
use std::collections::HashMap;

/// Index the virtual tree: requested index -> node at that index.
///
/// Widgets and thunks are index-occupying leaves; their contents are opaque.
pub fn tree_index<'a>(tree: &'a VNode, indices: &[usize]) -> HashMap<usize, &'a VNode> {
    let mut nodes = HashMap::new();
    if !indices.is_empty() {
        recurse_tree(tree, indices, 0, &mut nodes);
    }
    nodes
}

fn recurse_tree<'a>(
    node: &'a VNode,
    indices: &[usize],
    index: usize,
    out: &mut HashMap<usize, &'a VNode>,
) {
    if !index_in_range(indices, index, index + node.count()) {
        return;
    }
    if indices.binary_search(&index).is_ok() {
        out.insert(index, node);
    }
    if let VNode::Element(element) = node {
        let mut cursor = index + 1;
        for child in element.children() {
            recurse_tree(child, indices, cursor, out);
            cursor += child.count();
        }
    }
}

/// Index the live tree by walking it in lockstep with the virtual tree it
/// was materialized from; the virtual subtree counts drive the skips.
pub(crate) fn live_index(
    root: &LiveNode,
    tree: &VNode,
    indices: &[usize],
) -> HashMap<usize, LiveNode> {
    let mut nodes = HashMap::new();
    if !indices.is_empty() {
        recurse_live(root, tree, indices, 0, &mut nodes);
    }
    nodes
}

fn recurse_live(
    node: &LiveNode,
    tree: &VNode,
    indices: &[usize],
    index: usize,
    out: &mut HashMap<usize, LiveNode>,
) {
    if !index_in_range(indices, index, index + tree.count()) {
        return;
    }
    if indices.binary_search(&index).is_ok() {
        out.insert(index, node.clone());
    }
    if let VNode::Element(element) = tree {
        let mut cursor = index + 1;
        for (position, child) in element.children().iter().enumerate() {
            let next = cursor + child.count();
            if index_in_range(indices, cursor, next) {
                match node.child(position) {
                    Some(live_child) => {
                        recurse_live(&live_child, child, indices, cursor, out);
                    }
                    None => {
                        log::warn!(
                            "live child {position} missing under {node:?}; indices {cursor}..{next} unmapped"
                        );
                    }
                }
            }
            cursor = next;
        }
    }
}

/// Any requested index in `[left, right)`? `indices` is sorted ascending.
fn index_in_range(indices: &[usize], left: usize, right: usize) -> bool {
    match indices.binary_search(&left) {
        Ok(_) => true,
        Err(position) => position < indices.len() && indices[position] < right,
    }
}

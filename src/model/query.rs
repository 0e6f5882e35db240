//! Filter-query generation.
//!
//! A selection is exported as a query expression the data layer can run
//! against the original, un-rendered dataset: a single named node, a chain
//! between two named endpoints, or a subtree rooted at a name with a depth
//! bound. The bracket grammar is owned by the query collaborator; this
//! module only emits it.

use crate::forest::{Forest, NodeRef};
use serde::Serialize;
use serde_json::json;

/// Shape of the current selection, ready to serialize into the external
/// query grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectionQuery {
    /// Match everything; emitted for an empty selection.
    All,
    Single {
        name: String,
    },
    /// The selection forms a strict parent-to-child chain.
    Chain {
        from: String,
        to: String,
    },
    /// The selection spans a subtree: match below `root` down to
    /// `max_depth`.
    Subtree {
        root: String,
        max_depth: u32,
    },
}

impl SelectionQuery {
    /// Render into the collaborator's JSON grammar.
    pub fn to_query_string(&self) -> String {
        let value = match self {
            SelectionQuery::All => json!(["*"]),
            SelectionQuery::Single { name } => json!([{ "name": name }]),
            SelectionQuery::Chain { from, to } => {
                json!([{ "name": from }, "*", { "name": to }])
            }
            SelectionQuery::Subtree { root, max_depth } => {
                json!([{ "name": root }, "*", { "depth": format!("<={}", max_depth) }])
            }
        };
        value.to_string()
    }
}

/// Classify the current selection.
///
/// The leftmost endpoint is the shallowest selected node, the rightmost the
/// deepest; a chain requires every consecutive pair of depth-sorted nodes
/// to be linked parent to child within one tree.
pub(crate) fn selection_query(forest: &Forest, selection: &[NodeRef]) -> SelectionQuery {
    let Some(&first) = selection.first() else {
        return SelectionQuery::All;
    };

    let depth_of = |r: &NodeRef| -> u32 {
        forest
            .current_tree(r.tree)
            .map(|t| t.node(r.node).depth)
            .unwrap_or(0)
    };
    let name_of = |r: &NodeRef| -> String {
        forest
            .current_tree(r.tree)
            .map(|t| t.node(r.node).name().to_string())
            .unwrap_or_default()
    };

    let mut leftmost = first;
    let mut rightmost = first;
    for reference in selection {
        if depth_of(reference) < depth_of(&leftmost) {
            leftmost = *reference;
        }
        if depth_of(reference) > depth_of(&rightmost) {
            rightmost = *reference;
        }
    }

    if selection.len() == 1 {
        SelectionQuery::Single {
            name: name_of(&leftmost),
        }
    } else if is_chain(forest, selection) {
        SelectionQuery::Chain {
            from: name_of(&leftmost),
            to: name_of(&rightmost),
        }
    } else {
        SelectionQuery::Subtree {
            root: name_of(&leftmost),
            max_depth: depth_of(&rightmost),
        }
    }
}

fn is_chain(forest: &Forest, selection: &[NodeRef]) -> bool {
    let tree_index = selection[0].tree;
    if selection.iter().any(|r| r.tree != tree_index) {
        return false;
    }
    let Some(tree) = forest.current_tree(tree_index) else {
        return false;
    };

    let mut sorted = selection.to_vec();
    sorted.sort_by_key(|r| tree.node(r.node).depth);
    sorted
        .windows(2)
        .all(|pair| tree.node(pair[1].node).parent == Some(pair[0].node))
}

/// Serialize the currently visible leaves plus any composed-away nodes into
/// a filter expression for the originating query layer.
pub(crate) fn snapshot_query(forest: &Forest, composed: &[NodeRef]) -> String {
    let mut include = Vec::new();
    for tree in forest.trees() {
        for leaf in tree.visible_leaves() {
            include.push(json!({ "name": tree.node(leaf).name() }));
        }
    }

    let mut exclude = Vec::new();
    for reference in composed {
        if reference.generation != forest.generation() {
            continue;
        }
        let Some(tree) = forest.current_tree(reference.tree) else {
            continue;
        };
        if tree.contains(reference.node) {
            exclude.push(json!({ "name": tree.node(reference.node).name() }));
        }
    }

    json!({ "include": include, "exclude": exclude }).to_string()
}

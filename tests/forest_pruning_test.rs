//! End-to-end pruning behavior over the forest: the documented scenarios,
//! the structural invariants, and prune idempotence.

use callforest::{parse_forest, Forest, NodeId, ShowFilter, Tree};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

/// Walk visible and hidden links from a node.
fn reachable(tree: &Tree, start: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        out.push(id);
        let node = tree.node(id);
        for &child in node.children.iter().chain(node.hidden.iter()) {
            stack.push(child);
        }
    }
    out
}

/// `children` and `hidden` partition a node's offspring: never overlapping.
fn assert_partition(tree: &Tree) {
    for id in reachable(tree, tree.root()) {
        let node = tree.node(id);
        let visible: BTreeSet<usize> = node.children.iter().map(|c| c.index()).collect();
        let hidden: BTreeSet<usize> = node.hidden.iter().map(|c| c.index()).collect();
        assert!(
            visible.is_disjoint(&hidden),
            "node {} lists offspring as both visible and hidden",
            id.index()
        );
    }
}

/// Flatten the visible tree plus every aggregate's elided subtrees and
/// collect the original (normal-node) ids encountered.
fn collect_original_ids(tree: &Tree, start: NodeId, out: &mut Vec<usize>) {
    let node = tree.node(start);
    match node.aggregate() {
        Some(data) => {
            for &elided in &data.elided {
                collect_original_ids(tree, elided, out);
            }
        }
        None => {
            out.push(node.id);
            for &child in &node.children {
                collect_original_ids(tree, child, out);
            }
        }
    }
}

/// Every original node id appears at most once across visible children and
/// elided lists.
fn assert_no_duplication(tree: &Tree) {
    let mut ids = Vec::new();
    collect_original_ids(tree, tree.root(), &mut ids);
    let unique: BTreeSet<usize> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "an original node is displayed twice");
}

/// Structural signature of the visible tree: per preorder node, its
/// original id, whether it is synthetic, and the ids it elides.
fn structure(tree: &Tree) -> Vec<(usize, bool, Vec<usize>)> {
    tree.descendants()
        .into_iter()
        .map(|id| {
            let node = tree.node(id);
            let elided = node
                .aggregate()
                .map(|data| {
                    let mut ids: Vec<usize> =
                        data.elided.iter().map(|&e| tree.node(e).id).collect();
                    ids.sort_unstable();
                    ids
                })
                .unwrap_or_default();
            (node.id, node.is_aggregate(), elided)
        })
        .collect()
}

#[test]
fn scenario_zero_filter_elides_the_zero_child() {
    // One tree: root with children X = 0 and Y = 5 on metric "time".
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "root"},
            "metrics": {"time": 0.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "X"}, "metrics": {"time": 0.0}, "attributes": {}},
                {"frame": {"name": "Y"}, "metrics": {"time": 5.0}, "attributes": {}}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();

    let tree = forest.current_tree(0).unwrap();
    let root = tree.node(tree.root());
    assert_eq!(root.children.len(), 2);

    let y = tree.node(root.children[0]);
    assert_eq!(y.name(), "Y");
    assert!(!y.is_aggregate());

    let holder = tree.node(root.children[1]);
    let data = holder.aggregate().expect("zero child collapses into a holder");
    assert_eq!(data.elided.len(), 1);
    assert_eq!(data.metrics["time"], 0.0);
    assert_eq!(tree.node(data.elided[0]).name(), "X");

    assert_partition(tree);
    assert_no_duplication(tree);
}

#[test]
fn scenario_trees_sort_descending_by_node_count() {
    // Tree A has 3 nodes, tree B has 10: construction must order B first.
    let mut b_children = String::new();
    for i in 0..9 {
        if i > 0 {
            b_children.push(',');
        }
        b_children.push_str(&format!(
            r#"{{"frame": {{"name": "b{}"}}, "metrics": {{"time": 1.0}}, "attributes": {{}}}}"#,
            i
        ));
    }
    let defs = parse_forest(&format!(
        r#"[
            {{"frame": {{"name": "A"}}, "metrics": {{"time": 1.0}}, "attributes": {{}},
              "children": [
                {{"frame": {{"name": "a0"}}, "metrics": {{"time": 1.0}}, "attributes": {{}}}},
                {{"frame": {{"name": "a1"}}, "metrics": {{"time": 1.0}}, "attributes": {{}}}}
              ]}},
            {{"frame": {{"name": "B"}}, "metrics": {{"time": 1.0}}, "attributes": {{}},
              "children": [{}]}}
        ]"#,
        b_children
    ))
    .unwrap();

    let forest = Forest::new(&defs).unwrap();
    let first = forest.immutable_tree(0).unwrap();
    let second = forest.immutable_tree(1).unwrap();
    assert_eq!(first.node(first.root()).name(), "B");
    assert_eq!(first.size(), 10);
    assert_eq!(second.node(second.root()).name(), "A");
    assert_eq!(second.size(), 3);
}

#[test]
fn scenario_range_filter_keeps_ancestors_of_kept_nodes() {
    // Chain root(10) -> child(5) -> grandchild(1) pruned to [2, 8]:
    // the grandchild is elided, the child stays, and the root survives on
    // the strength of its descendant even though 10 is out of range.
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "root"},
            "metrics": {"time": 10.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "child"}, "metrics": {"time": 5.0}, "attributes": {},
                 "children": [
                    {"frame": {"name": "grandchild"}, "metrics": {"time": 1.0}, "attributes": {}}
                 ]}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();
    forest
        .aggregate_tree_data("time", &ShowFilter::Range { low: 2.0, high: 8.0 })
        .unwrap();

    let tree = forest.current_tree(0).unwrap();
    let names: Vec<&str> = tree
        .descendants()
        .iter()
        .map(|&id| tree.node(id).name())
        .collect();
    assert!(names.contains(&"root"));
    assert!(names.contains(&"child"));

    let child_id = tree.node(tree.root()).children[0];
    let child = tree.node(child_id);
    assert!(!child.is_aggregate());
    assert_eq!(child.children.len(), 1);
    let holder = tree.node(child.children[0]);
    let data = holder.aggregate().expect("grandchild elides into a holder");
    assert_eq!(data.elided.len(), 1);
    assert_eq!(tree.node(data.elided[0]).name(), "grandchild");

    assert_partition(tree);
    assert_no_duplication(tree);
}

#[test]
fn all_zero_tree_collapses_to_a_single_holder() {
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "root"},
            "metrics": {"time": 0.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "a"}, "metrics": {"time": 0.0}, "attributes": {},
                 "children": [{"frame": {"name": "b"}, "metrics": {"time": 0.0}, "attributes": {}}]},
                {"frame": {"name": "c"}, "metrics": {"time": 0.0}, "attributes": {}}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();

    let tree = forest.current_tree(0).unwrap();
    let root = tree.node(tree.root());
    assert_eq!(root.children.len(), 1);

    let holder = tree.node(root.children[0]);
    let data = holder.aggregate().expect("everything elides into one holder");
    assert_eq!(data.elided.len(), 2);
    assert_eq!(data.description.elided_subtrees, 2);
    assert_eq!(data.description.size, 3);
    assert_eq!(data.description.max_height, 1);
    assert_eq!(data.description.min_height, 0);

    assert_partition(tree);
    assert_no_duplication(tree);
}

#[test]
fn all_zero_leaf_tree_stays_a_single_leaf() {
    let defs =
        parse_forest(r#"[{"frame": {"name": "root"}, "metrics": {"time": 0.0}, "attributes": {}}]"#)
            .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();

    let tree = forest.current_tree(0).unwrap();
    assert_eq!(tree.size(), 1);
    assert!(tree.node(tree.root()).is_leaf());
}

#[test]
fn pruning_is_idempotent_across_fresh_passes() {
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "main"},
            "metrics": {"time": 3.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "hot"}, "metrics": {"time": 9.0}, "attributes": {},
                 "children": [
                    {"frame": {"name": "cold1"}, "metrics": {"time": 0.0}, "attributes": {}},
                    {"frame": {"name": "cold2"}, "metrics": {"time": 0.0}, "attributes": {}}
                 ]},
                {"frame": {"name": "idle"}, "metrics": {"time": 0.0}, "attributes": {}}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();

    forest
        .aggregate_tree_data("time", &ShowFilter::Zero)
        .unwrap();
    let first = structure(forest.current_tree(0).unwrap());

    forest
        .aggregate_tree_data("time", &ShowFilter::Zero)
        .unwrap();
    let second = structure(forest.current_tree(0).unwrap());

    assert_eq!(first, second);
}

#[test]
fn aggregate_min_max_only_widens_within_a_pass() {
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "main"},
            "metrics": {"time": 1.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "warm"}, "metrics": {"time": 4.0}, "attributes": {},
                 "children": [{"frame": {"name": "z1"}, "metrics": {"time": 0.0}, "attributes": {}}]},
                {"frame": {"name": "z2"}, "metrics": {"time": 0.0}, "attributes": {},
                 "children": [{"frame": {"name": "z3"}, "metrics": {"time": 0.0}, "attributes": {}}]}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();
    let after_init = forest.aggregate_min_max()["time"];
    assert!(!after_init.is_empty());

    forest
        .aggregate_tree_data("time", &ShowFilter::Range { low: 3.0, high: 5.0 })
        .unwrap();
    let after_range = forest.aggregate_min_max()["time"];
    assert!(after_range.min <= after_init.min);
    assert!(after_range.max >= after_init.max);
}

#[test]
fn baseline_survives_reset_after_user_pruning() {
    let defs = parse_forest(
        r#"[{
            "frame": {"name": "main"},
            "metrics": {"time": 2.0},
            "attributes": {},
            "children": [
                {"frame": {"name": "work"}, "metrics": {"time": 7.0}, "attributes": {}},
                {"frame": {"name": "idle"}, "metrics": {"time": 0.0}, "attributes": {}}
            ]
        }]"#,
    )
    .unwrap();
    let mut forest = Forest::new(&defs).unwrap();
    forest.initialize_pruned_trees("time").unwrap();
    let baseline = structure(forest.current_tree(0).unwrap());

    // Keep only the root's own value: both children elide into one group,
    // a different shape from the zero-filter baseline.
    forest
        .aggregate_tree_data("time", &ShowFilter::Range { low: 1.0, high: 3.0 })
        .unwrap();
    assert_ne!(structure(forest.current_tree(0).unwrap()), baseline);

    forest.reset_mutable();
    assert_eq!(structure(forest.current_tree(0).unwrap()), baseline);
}

//! Session-level behavior: manual collapse/expand, the prune state machine,
//! selection queries, the host bridge, and the experimental composition
//! operations.

use callforest::{
    ActiveTree, EngineConfig, Error, MemoryBridge, Model, NodeId, PruneRequest, Tree,
};
use pretty_assertions::assert_eq;

const FOREST_JSON: &str = r#"[{
    "frame": {"name": "main"},
    "metrics": {"time": 1.0, "time (inc)": 12.0},
    "attributes": {"rank": 0},
    "children": [
        {"frame": {"name": "solve"}, "metrics": {"time": 6.0, "time (inc)": 9.0}, "attributes": {},
         "children": [
            {"frame": {"name": "kernel"}, "metrics": {"time": 3.0, "time (inc)": 3.0}, "attributes": {}}
         ]},
        {"frame": {"name": "report"}, "metrics": {"time": 2.0, "time (inc)": 2.0}, "attributes": {}}
    ]
}]"#;

fn sample_model() -> Model {
    Model::from_json(FOREST_JSON, EngineConfig::default()).unwrap()
}

fn child_named(tree: &Tree, parent: NodeId, name: &str) -> Option<NodeId> {
    tree.node(parent)
        .children
        .iter()
        .copied()
        .find(|&c| tree.node(c).name() == name)
}

#[test]
fn double_click_collapse_then_expand_round_trips() {
    let mut model = sample_model();

    let tree = model.forest().current_tree(0).unwrap();
    let root = tree.root();
    let before: Vec<NodeId> = tree.node(root).children.clone();
    let solve = child_named(tree, root, "solve").unwrap();

    // Collapse: a degenerate one-element holder replaces the node in place.
    model.handle_double_click(model.node_ref(0, solve)).unwrap();
    let tree = model.forest().current_tree(0).unwrap();
    let children = &tree.node(root).children;
    assert_eq!(children.len(), before.len());
    let holder_id = children[0];
    let holder = tree.node(holder_id);
    let data = holder.aggregate().expect("collapse produces a holder");
    assert_eq!(data.elided, vec![solve]);
    assert_eq!(data.name, "solve");
    assert!(tree.node(root).hidden.contains(&solve));
    assert_eq!(model.state().last_clicked.map(|r| r.node), Some(solve));

    // Expand: the original child returns to its old position.
    model.handle_double_click(model.node_ref(0, holder_id)).unwrap();
    let tree = model.forest().current_tree(0).unwrap();
    assert_eq!(tree.node(root).children, before);
    assert!(!tree.node(root).hidden.contains(&solve));
}

#[test]
fn double_click_on_the_root_is_a_no_op() {
    let mut model = sample_model();
    let root = model.forest().current_tree(0).unwrap().root();
    let before = model.forest().current_tree(0).unwrap().size();

    model.handle_double_click(model.node_ref(0, root)).unwrap();
    assert_eq!(model.forest().current_tree(0).unwrap().size(), before);
}

#[test]
fn expanding_a_multi_elided_holder_restores_each_sibling() {
    let mut model = sample_model();
    // Prune everything except the root's own value: both children elide
    // into a single holder.
    model
        .prune_tree(PruneRequest::Range { low: 0.5, high: 1.5 })
        .unwrap();

    let tree = model.forest().current_tree(0).unwrap();
    let root = tree.root();
    let holder_id = tree.node(root).children[0];
    let elided = tree.node(holder_id).aggregate().unwrap().elided.clone();
    assert_eq!(elided.len(), 2);

    model.handle_double_click(model.node_ref(0, holder_id)).unwrap();
    let tree = model.forest().current_tree(0).unwrap();
    let children = &tree.node(root).children;
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| elided.contains(c)));
    assert!(tree.node(root).hidden.is_empty());
}

#[test]
fn stale_references_fail_loudly() {
    let mut model = sample_model();
    let root_ref = model.node_ref(0, model.forest().current_tree(0).unwrap().root());

    model
        .prune_tree(PruneRequest::Range { low: 1.0, high: 9.0 })
        .unwrap();

    match model.handle_double_click(root_ref) {
        Err(Error::StaleReference { expected, found }) => assert!(found < expected),
        other => panic!("expected a stale-reference error, got {:?}", other.err()),
    }
}

#[test]
fn disabling_prune_falls_back_to_the_baseline() {
    let mut model = sample_model();
    let baseline_size = model.forest().current_tree(0).unwrap().size();

    model.enable_prune_tree(true, 1.5).unwrap();
    assert!(model.state().prune_enabled);

    model.enable_prune_tree(false, 1.5).unwrap();
    assert!(!model.state().prune_enabled);
    assert_eq!(model.forest().current_tree(0).unwrap().size(), baseline_size);
}

#[test]
fn selection_queries_follow_the_grammar() {
    let mut model = sample_model();

    let tree = model.forest().current_tree(0).unwrap();
    let root = tree.root();
    let solve = child_named(tree, root, "solve").unwrap();
    let kernel = child_named(tree, solve, "kernel").unwrap();
    let report = child_named(tree, root, "report").unwrap();

    // Single node.
    model.update_selected(vec![model.node_ref(0, solve)]).unwrap();
    assert_eq!(model.state().stored_query, r#"[{"name":"solve"}]"#);

    // A parent-to-child chain.
    let chain = vec![
        model.node_ref(0, root),
        model.node_ref(0, solve),
        model.node_ref(0, kernel),
    ];
    model.update_selected(chain).unwrap();
    assert_eq!(
        model.state().stored_query,
        r#"[{"name":"main"},"*",{"name":"kernel"}]"#
    );

    // Branching selection: a subtree query bounded by the deepest node.
    let spread = vec![
        model.node_ref(0, root),
        model.node_ref(0, report),
        model.node_ref(0, kernel),
    ];
    model.update_selected(spread).unwrap();
    assert_eq!(
        model.state().stored_query,
        r#"[{"name":"main"},"*",{"depth":"<=2"}]"#
    );

    // Clearing the selection matches everything again.
    model.update_selected(Vec::new()).unwrap();
    assert_eq!(model.state().stored_query, r#"["*"]"#);
}

#[test]
fn selection_tooltip_renders_the_metric_table() {
    let mut model = sample_model();
    let tree = model.forest().current_tree(0).unwrap();
    let solve = child_named(tree, tree.root(), "solve").unwrap();

    model.update_selected(vec![model.node_ref(0, solve)]).unwrap();
    let tip = &model.state().tip_text;
    assert!(tip.contains("<td>solve</td>"));
    assert!(tip.contains("<td>6.00</td>"));
    assert!(tip.contains("<td>9.00</td>"));
}

#[test]
fn bridge_round_trip_reads_input_and_receives_queries() {
    let bridge = MemoryBridge::new().with_variable("hatchet_tree_def", FOREST_JSON);
    let mut model = Model::from_bridge(Box::new(bridge), EngineConfig::default()).unwrap();

    let tree = model.forest().current_tree(0).unwrap();
    let solve = child_named(tree, tree.root(), "solve").unwrap();
    model.update_selected(vec![model.node_ref(0, solve)]).unwrap();

    // The model owns the bridge; the stored query mirrors what it wrote.
    assert_eq!(model.state().stored_query, r#"[{"name":"solve"}]"#);

    let snapshot = model.store_snapshot_query();
    assert!(snapshot.contains(r#""include""#));
    assert!(snapshot.contains(r#""kernel""#));
    assert!(snapshot.contains(r#""report""#));
}

#[test]
fn missing_bridge_variable_is_a_construction_error() {
    let bridge = MemoryBridge::new();
    assert!(matches!(
        Model::from_bridge(Box::new(bridge), EngineConfig::default()),
        Err(Error::MissingVariable(_))
    ));
}

#[test]
fn composition_lifts_children_and_decomposition_restores_them() {
    let mut model = sample_model();
    let tree = model.forest().current_tree(0).unwrap();
    let root = tree.root();
    let solve = child_named(tree, root, "solve").unwrap();
    let kernel = child_named(tree, solve, "kernel").unwrap();

    model.handle_node_composition(model.node_ref(0, solve)).unwrap();
    let tree = model.forest().current_tree(0).unwrap();
    assert!(child_named(tree, root, "solve").is_none());
    assert_eq!(tree.node(kernel).parent, Some(root));
    assert_eq!(tree.node(kernel).true_parent, Some(solve));
    assert_eq!(tree.node(kernel).depth, 1);
    assert_eq!(model.state().composed.len(), 1);

    model.handle_node_decomposition(model.node_ref(0, solve)).unwrap();
    let tree = model.forest().current_tree(0).unwrap();
    assert!(child_named(tree, root, "solve").is_some());
    assert_eq!(tree.node(kernel).parent, Some(solve));
    assert_eq!(tree.node(kernel).true_parent, None);
    assert_eq!(tree.node(kernel).depth, 2);
    assert!(model.state().composed.is_empty());
}

#[test]
fn display_toggles_cycle_and_notify() {
    use std::cell::Cell;
    use std::rc::Rc;

    let mut model = sample_model();
    let notifications = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&notifications);
    model.register(move || {
        counter.set(counter.get() + 1);
        Ok(())
    });

    model.update_legends();
    model.change_color_scheme();
    model.update_active_tree(ActiveTree::Tree("main".to_string()));
    model.reset_view();

    assert_eq!(notifications.get(), 4);
    assert_eq!(model.state().active_tree, ActiveTree::Tree("main".to_string()));
    assert!(model.consume_reset_view());
    assert!(!model.consume_reset_view());
}

//! Arena-backed call trees.
//!
//! Nodes live in a per-tree arena indexed by [`NodeId`]; parent/child links
//! are indices, so detaching and reattaching a subtree is a constant-time
//! list edit and never invalidates other references. The arena is an
//! `im::Vector`, which makes the "deep structural copy" every pruning pass
//! starts from a cheap persistent clone of the canonical tree.
//!
//! Each node's offspring are partitioned between `children` (visible) and
//! `hidden` (elided, retained for re-expansion); the two lists are disjoint
//! at every stable point between mutations.

use crate::core::{AttributeMap, MetricMap};
use crate::input::TreeDef;
use im::Vector;
use serde::Serialize;

/// Index of a node within one tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of an original call-site node.
#[derive(Debug, Clone, Serialize)]
pub struct FrameData {
    pub name: String,
    pub metrics: MetricMap,
    pub attributes: AttributeMap,
}

/// Derived shape summary of the subtrees an aggregate node stands in for.
#[derive(Debug, Clone, Serialize)]
pub struct SubtreeDescription {
    /// Total node count across the elided subtrees.
    pub size: usize,
    /// Number of elided sibling subtrees.
    pub elided_subtrees: usize,
    /// Tallest elided subtree.
    pub max_height: u32,
    /// Shortest elided subtree.
    pub min_height: u32,
}

/// Payload of a synthetic node summarizing one or more elided siblings.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateData {
    /// Representative original node this summary is displayed as.
    /// Display reference only; ownership runs through `elided`.
    pub prototype: NodeId,
    /// Roots of the sibling subtrees this node summarizes.
    pub elided: Vec<NodeId>,
    /// Aggregated metric table (see `build_aggregate_node`).
    pub metrics: MetricMap,
    pub description: SubtreeDescription,
    /// Stable identifier carried over from the prototype.
    pub nid: i64,
    /// Prototype's display label.
    pub name: String,
}

/// A node is exactly one of: an original call site, or a synthetic
/// aggregate. Aggregates never have real children.
#[derive(Debug, Clone, Serialize)]
pub enum NodeKind {
    Normal(FrameData),
    Aggregate(AggregateData),
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Forest-wide sequential id, offset across trees at instantiation.
    /// Aggregate nodes copy their prototype's id as an identity field.
    pub id: usize,
    pub depth: u32,
    pub height: u32,
    pub parent: Option<NodeId>,
    /// Currently visible offspring, in display order.
    pub children: Vec<NodeId>,
    /// Elided offspring, retained for later re-expansion.
    pub hidden: Vec<NodeId>,
    /// Transient display predicate result, recomputed before every prune.
    pub show: bool,
    /// Transient bottom-up show-sum over the visible subtree.
    pub value: f64,
    /// Provenance link for composed-away ancestors.
    pub true_parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, NodeKind::Aggregate(_))
    }

    /// Visible offspring exhausted; displayed as a leaf.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Normal(frame) => &frame.name,
            NodeKind::Aggregate(data) => &data.name,
        }
    }

    /// The node's display value for `metric`: its own measurement for an
    /// original node, the aggregated value for a synthetic one.
    pub fn metric(&self, metric: &str) -> f64 {
        let table = match &self.kind {
            NodeKind::Normal(frame) => &frame.metrics,
            NodeKind::Aggregate(data) => &data.metrics,
        };
        table.get(metric).copied().unwrap_or(0.0)
    }

    /// Stable cross-session identifier: `_hatchet_nid` when the data source
    /// supplied one, else the synthesized forest-wide id.
    pub fn stable_nid(&self) -> i64 {
        match &self.kind {
            NodeKind::Normal(frame) => frame
                .metrics
                .get("_hatchet_nid")
                .map(|v| *v as i64)
                .unwrap_or(self.id as i64),
            NodeKind::Aggregate(data) => data.nid,
        }
    }

    pub fn aggregate(&self) -> Option<&AggregateData> {
        match &self.kind {
            NodeKind::Aggregate(data) => Some(data),
            NodeKind::Normal(_) => None,
        }
    }

    pub fn frame(&self) -> Option<&FrameData> {
        match &self.kind {
            NodeKind::Normal(frame) => Some(frame),
            NodeKind::Aggregate(_) => None,
        }
    }
}

/// One call tree: a node arena plus its root and a visible-node-count cache.
#[derive(Debug, Clone, Serialize)]
pub struct Tree {
    nodes: Vector<Node>,
    root: NodeId,
    size: usize,
}

impl Tree {
    /// Instantiate a tree from its definition, assigning sequential
    /// forest-wide ids starting at `*next_id`. Children always land at
    /// higher arena indices than their parent.
    pub(crate) fn from_def(def: &TreeDef, next_id: &mut usize) -> Self {
        let mut nodes: Vector<Node> = Vector::new();
        let root = build_node(&mut nodes, def, 0, None, next_id);
        let mut tree = Tree {
            nodes,
            root,
            size: 0,
        };
        tree.compute_heights();
        tree.refresh_size();
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total arena entries, detached and synthetic nodes included.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push_back(node);
        id
    }

    /// Cached count of visible nodes; refreshed after structural mutation.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn refresh_size(&mut self) {
        self.size = self.descendants().len();
    }

    pub fn height(&self) -> u32 {
        self.node(self.root).height
    }

    /// Visible nodes in preorder, starting at the root.
    pub fn descendants(&self) -> Vec<NodeId> {
        self.descendants_of(self.root)
    }

    /// Visible nodes of the subtree rooted at `start`, in preorder.
    pub fn descendants_of(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.node(id).children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// All nodes reachable from `start` through visible and hidden links.
    pub(crate) fn reachable_of(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            let node = self.node(id);
            for &child in node.children.iter().chain(node.hidden.iter()) {
                stack.push(child);
            }
        }
        out
    }

    /// Visible leaves in display order.
    pub fn visible_leaves(&self) -> Vec<NodeId> {
        self.descendants()
            .into_iter()
            .filter(|&id| self.node(id).is_leaf())
            .collect()
    }

    /// Recompute the bottom-up show-sum: each node's `value` becomes its own
    /// show flag plus the sum over its visible children's values. Children
    /// follow their parent in preorder, so one reversed pass settles the
    /// whole tree.
    pub(crate) fn sum_show(&mut self) {
        let order = self.descendants();
        for &id in order.iter().rev() {
            let children = self.node(id).children.clone();
            let child_sum: f64 = children.iter().map(|&c| self.node(c).value).sum();
            let own = if self.node(id).show { 1.0 } else { 0.0 };
            self.node_mut(id).value = own + child_sum;
        }
    }

    /// Sum `metric` over the visible subtree at `start`. An aggregate
    /// descendant contributes its already-aggregated value instead of being
    /// re-walked, keeping aggregation linear in tree size.
    pub(crate) fn subtree_metric_sum(&self, start: NodeId, metric: &str) -> f64 {
        let mut total = 0.0;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match &node.kind {
                NodeKind::Aggregate(data) => {
                    total += data.metrics.get(metric).copied().unwrap_or(0.0);
                }
                NodeKind::Normal(frame) => {
                    total += frame.metrics.get(metric).copied().unwrap_or(0.0);
                    for &child in &node.children {
                        stack.push(child);
                    }
                }
            }
        }
        total
    }

    /// Count the nodes of the visible subtree at `start`; an aggregate
    /// descendant counts as the nodes it summarizes.
    pub(crate) fn subtree_node_count(&self, start: NodeId) -> usize {
        let mut total = 0;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match &node.kind {
                NodeKind::Aggregate(data) => total += data.description.size,
                NodeKind::Normal(_) => {
                    total += 1;
                    for &child in &node.children {
                        stack.push(child);
                    }
                }
            }
        }
        total
    }

    /// Shift the depth of every node reachable from `start` by `delta`.
    pub(crate) fn shift_subtree_depth(&mut self, start: NodeId, delta: i32) {
        for id in self.reachable_of(start) {
            let node = self.node_mut(id);
            node.depth = (node.depth as i32 + delta).max(0) as u32;
        }
    }

    fn compute_heights(&mut self) {
        let order = self.descendants();
        for &id in order.iter().rev() {
            let children = self.node(id).children.clone();
            let height = children
                .iter()
                .map(|&c| self.node(c).height + 1)
                .max()
                .unwrap_or(0);
            self.node_mut(id).height = height;
        }
    }
}

fn build_node(
    nodes: &mut Vector<Node>,
    def: &TreeDef,
    depth: u32,
    parent: Option<NodeId>,
    next_id: &mut usize,
) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push_back(Node {
        id: *next_id,
        depth,
        height: 0,
        parent,
        children: Vec::new(),
        hidden: Vec::new(),
        show: false,
        value: 0.0,
        true_parent: None,
        kind: NodeKind::Normal(FrameData {
            name: def.display_name().to_string(),
            metrics: def.metrics.clone().unwrap_or_default(),
            attributes: def.attributes.clone().unwrap_or_default(),
        }),
    });
    *next_id += 1;

    let mut children = Vec::with_capacity(def.children.len());
    for child_def in &def.children {
        children.push(build_node(nodes, child_def, depth + 1, Some(id), next_id));
    }
    nodes[id.0].children = children;
    id
}

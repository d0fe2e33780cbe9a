//! Node and edge taxonomy for symbolic call graphs.
//!
//! A plan's graph is a multidigraph: multiple edges between the same pair
//! of nodes are meaningful (the same producer can be both positional
//! argument 0 and keyword argument `a` of one call). Node identity is the
//! stable arena index, so handles stay valid across plan clones.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::FxHashSet;

use crate::call_site::CallSite;
use crate::errors::RunError;
use crate::func::SymFn;
use crate::value::Value;

pub(crate) type PlanGraph = StableDiGraph<NodeData, EdgeKind>;

/// Handle to a node within a [`crate::Plan`].
///
/// Handles are identity-based: two nodes created from identical inputs are
/// distinct. Cloning a plan preserves handles; handles from unrelated plans
/// never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub(crate) lineage: u64,
    pub(crate) index: NodeIndex,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Literal(Value),
    Call(SymFn),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub scope: Vec<String>,
    pub implicit_scope: Vec<String>,
    pub call_site: CallSite,
}

impl NodeData {
    pub fn full_scope(&self) -> Vec<String> {
        let mut scope = self.scope.clone();
        scope.extend(self.implicit_scope.iter().cloned());
        scope
    }

    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Literal(value) => value.compact(),
            NodeKind::Call(func) => func.name().to_string(),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call(_))
    }
}

/// The relationship carried by an edge from a producer to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// The producer is the `index`-th positional argument of the consumer.
    Positional { index: usize },
    /// The producer is the keyword argument `name` of the consumer; `index`
    /// preserves the order keywords were written in.
    Keyword { name: String, index: usize },
    /// The producer must complete before the consumer runs; no value flows.
    Dependency,
}

impl EdgeKind {
    pub fn is_value(&self) -> bool {
        !matches!(self, EdgeKind::Dependency)
    }
}

/// The symbolic args and kwargs of a call, read back from its in-edges.
pub(crate) fn argument_nodes(
    graph: &PlanGraph,
    call: NodeIndex,
) -> (Vec<NodeIndex>, Vec<(String, NodeIndex)>) {
    let mut positional: Vec<(usize, NodeIndex)> = Vec::new();
    let mut keyword: Vec<(usize, String, NodeIndex)> = Vec::new();
    for edge in graph.edges_directed(call, Direction::Incoming) {
        match edge.weight() {
            EdgeKind::Positional { index } => positional.push((*index, edge.source())),
            EdgeKind::Keyword { name, index } => {
                keyword.push((*index, name.clone(), edge.source()))
            }
            EdgeKind::Dependency => {}
        }
    }
    positional.sort_by_key(|(index, _)| *index);
    keyword.sort_by_key(|(index, _, _)| *index);
    (
        positional.into_iter().map(|(_, node)| node).collect(),
        keyword
            .into_iter()
            .map(|(_, name, node)| (name, node))
            .collect(),
    )
}

pub(crate) fn distinct_predecessors(graph: &PlanGraph, node: NodeIndex) -> FxHashSet<NodeIndex> {
    graph
        .neighbors_directed(node, Direction::Incoming)
        .collect()
}

pub(crate) fn distinct_successors(graph: &PlanGraph, node: NodeIndex) -> FxHashSet<NodeIndex> {
    graph
        .neighbors_directed(node, Direction::Outgoing)
        .collect()
}

pub(crate) fn predecessor_count(graph: &PlanGraph, node: NodeIndex) -> usize {
    distinct_predecessors(graph, node).len()
}

pub(crate) fn source_nodes(graph: &PlanGraph) -> impl Iterator<Item = NodeIndex> + '_ {
    graph
        .node_indices()
        .filter(|&node| graph.neighbors_directed(node, Direction::Incoming).next().is_none())
}

/// All nodes having a path to any of the given seeds, seeds included.
pub(crate) fn all_ancestors(
    graph: &PlanGraph,
    seeds: impl IntoIterator<Item = NodeIndex>,
) -> FxHashSet<NodeIndex> {
    let mut visited: FxHashSet<NodeIndex> = FxHashSet::default();
    let mut frontier: Vec<NodeIndex> = seeds.into_iter().collect();
    while let Some(node) = frontier.pop() {
        if !visited.insert(node) {
            continue;
        }
        frontier.extend(graph.neighbors_directed(node, Direction::Incoming));
    }
    visited
}

/// Kahn's algorithm; fails with a cycle error if any node is unreachable
/// from the sources.
pub(crate) fn assert_acyclic(graph: &PlanGraph) -> Result<(), RunError> {
    let mut remaining: rustc_hash::FxHashMap<NodeIndex, usize> = rustc_hash::FxHashMap::default();
    let mut queue: Vec<NodeIndex> = Vec::new();
    for node in graph.node_indices() {
        let count = predecessor_count(graph, node);
        if count == 0 {
            queue.push(node);
        } else {
            remaining.insert(node, count);
        }
    }
    let mut visited = queue.len();
    while let Some(node) = queue.pop() {
        for successor in distinct_successors(graph, node) {
            let count = remaining
                .get_mut(&successor)
                .expect("successor must have a predecessor count");
            *count -= 1;
            if *count == 0 {
                queue.push(successor);
                visited += 1;
            }
        }
    }
    if visited != graph.node_count() {
        return Err(RunError::Cycle);
    }
    Ok(())
}

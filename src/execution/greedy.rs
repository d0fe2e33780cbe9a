//! Greedy scheduling priorities.
//!
//! Produces a mapping from node to priority where lower is more important.
//! Nodes tied together by argument edges are contracted into components,
//! the component graph's condensation is topologically ordered, and each
//! pseudo-sink (a node with no outgoing argument edges) is prioritized
//! together with its ancestors, in order. The effect is that workers finish
//! one output of the plan before fanning out to the next.

use petgraph::algo::{condensation, toposort};
use petgraph::graph::DiGraph;
use petgraph::stable_graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdgeReferences, NodeIndexable};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::{distinct_predecessors, PlanGraph};

pub(crate) fn priority_mapping(graph: &PlanGraph) -> FxHashMap<NodeIndex, i64> {
    // Contract argument-connected components, ignoring literal producers
    // and dependency edges.
    let mut union_find = UnionFind::<usize>::new(graph.node_bound());
    for edge in graph.edge_references() {
        if graph[edge.source()].is_call() && edge.weight().is_value() {
            union_find.union(edge.source().index(), edge.target().index());
        }
    }

    let mut component_of: FxHashMap<usize, petgraph::graph::NodeIndex> = FxHashMap::default();
    let mut components: DiGraph<Vec<NodeIndex>, ()> = DiGraph::new();
    for node in graph.node_indices() {
        let representative = union_find.find(node.index());
        let component = *component_of
            .entry(representative)
            .or_insert_with(|| components.add_node(Vec::new()));
        components[component].push(node);
    }

    let mut seen: FxHashSet<(petgraph::graph::NodeIndex, petgraph::graph::NodeIndex)> =
        FxHashSet::default();
    let mut edges = Vec::new();
    for edge in graph.edge_references() {
        let source = component_of[&union_find.find(edge.source().index())];
        let target = component_of[&union_find.find(edge.target().index())];
        if source != target && seen.insert((source, target)) {
            edges.push((source, target));
        }
    }
    for (source, target) in edges {
        components.add_edge(source, target, ());
    }

    // The component graph is usually but not always acyclic; contracting
    // its strongly connected components always is.
    let condensed = condensation(components, true);
    let order = toposort(&condensed, None).expect("condensation is acyclic");

    let mut pseudo_sinks: Vec<NodeIndex> = Vec::new();
    for condensed_node in order {
        for component in &condensed[condensed_node] {
            for &node in component {
                let only_dependencies = graph
                    .edges_directed(node, Direction::Outgoing)
                    .all(|edge| !edge.weight().is_value());
                if only_dependencies {
                    pseudo_sinks.push(node);
                }
            }
        }
    }

    // Each pseudo-sink and its ancestors are prioritized in order.
    let mut priorities: FxHashMap<NodeIndex, i64> = FxHashMap::default();
    let mut visited: FxHashSet<NodeIndex> = FxHashSet::default();
    let mut stack = pseudo_sinks;
    stack.reverse();
    let mut next_priority = 0i64;
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        priorities.insert(node, next_priority);
        next_priority += 1;
        stack.extend(distinct_predecessors(graph, node));
    }
    priorities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::CallSite;
    use crate::func::SymFn;
    use crate::graph::{EdgeKind, NodeData, NodeKind};
    use crate::value::Value;

    fn call(graph: &mut PlanGraph, name: &str) -> NodeIndex {
        graph.add_node(NodeData {
            kind: NodeKind::Call(SymFn::nullary(name, || Ok(Value::Null))),
            scope: Vec::new(),
            implicit_scope: Vec::new(),
            call_site: CallSite::capture(),
        })
    }

    #[test]
    fn every_node_receives_a_priority() {
        let mut graph = PlanGraph::default();
        let a = call(&mut graph, "a");
        let b = call(&mut graph, "b");
        let c = call(&mut graph, "c");
        graph.add_edge(a, b, EdgeKind::Positional { index: 0 });
        graph.add_edge(b, c, EdgeKind::Positional { index: 0 });

        let priorities = priority_mapping(&graph);
        assert_eq!(priorities.len(), 3);
    }

    #[test]
    fn a_sink_and_its_ancestors_outrank_an_independent_chain() {
        let mut graph = PlanGraph::default();
        // Two independent chains; the first chain's sink appears first in
        // topological order, so its whole chain is prioritized ahead.
        let a1 = call(&mut graph, "a1");
        let a2 = call(&mut graph, "a2");
        graph.add_edge(a1, a2, EdgeKind::Positional { index: 0 });
        let b1 = call(&mut graph, "b1");
        let b2 = call(&mut graph, "b2");
        graph.add_edge(b1, b2, EdgeKind::Positional { index: 0 });

        let priorities = priority_mapping(&graph);
        let chain_a = priorities[&a1].max(priorities[&a2]);
        let chain_b = priorities[&b1].min(priorities[&b2]);
        let a_first = chain_a < chain_b;
        let b_first = priorities[&b1].max(priorities[&b2])
            < priorities[&a1].min(priorities[&a2]);
        assert!(a_first || b_first, "one chain must fully precede the other");
    }

    #[test]
    fn dependency_cycles_do_not_panic() {
        let mut graph = PlanGraph::default();
        let a = call(&mut graph, "a");
        let b = call(&mut graph, "b");
        graph.add_edge(a, b, EdgeKind::Dependency);
        graph.add_edge(b, a, EdgeKind::Dependency);
        let priorities = priority_mapping(&graph);
        assert_eq!(priorities.len(), 2);
    }
}

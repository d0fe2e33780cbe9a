//! Discarding plan nodes that cannot affect the requested outputs.

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::{all_ancestors, distinct_predecessors, distinct_successors, EdgeKind, NodeKind};
use crate::plan::Plan;

/// Keep only the required nodes, the output node, and their ancestors,
/// then drop literals that merely relay dependencies.
pub(crate) fn prune_plan(
    plan: &mut Plan,
    required: impl IntoIterator<Item = crate::graph::Node>,
    output: Option<crate::graph::Node>,
) {
    let mut seeds: Vec<NodeIndex> = required.into_iter().map(|node| node.index).collect();
    if let Some(output) = output {
        seeds.push(output.index);
    }
    let keep = all_ancestors(&plan.graph, seeds);
    let doomed: Vec<NodeIndex> = plan
        .graph
        .node_indices()
        .filter(|index| !keep.contains(index))
        .collect();
    for index in doomed {
        plan.graph.remove_node(index);
    }

    let literals: Vec<NodeIndex> = plan
        .graph
        .node_indices()
        .filter(|&index| {
            matches!(plan.graph[index].kind, NodeKind::Literal(_))
                && output.map_or(true, |output| output.index != index)
        })
        .collect();
    for literal in literals {
        prune_literal_if_trivial(plan, literal);
    }
}

/// Prunes the literal if it is not an argument to any call and removing it
/// does not increase the number of dependency edges in the graph.
fn prune_literal_if_trivial(plan: &mut Plan, literal: NodeIndex) {
    let feeds_arguments = plan
        .graph
        .edges_directed(literal, Direction::Outgoing)
        .any(|edge| edge.weight().is_value());
    if feeds_arguments {
        return;
    }

    let predecessors = distinct_predecessors(&plan.graph, literal);
    let successors = distinct_successors(&plan.graph, literal);
    let m = predecessors.len();
    let n = successors.len();
    if m * n > m + n {
        return;
    }

    for &predecessor in &predecessors {
        for &successor in &successors {
            plan.graph
                .add_edge(predecessor, successor, EdgeKind::Dependency);
        }
    }
    plan.graph.remove_node(literal);
}

/// Remove literal nodes with no incoming edges; they carry values, not
/// work, and their values are bound into consumers before execution. When
/// a predicate is given, only literals it selects are pruned.
pub(crate) fn prune_source_literals(plan: &mut Plan, predicate: Option<&dyn Fn(NodeIndex) -> bool>) {
    let doomed: Vec<NodeIndex> = plan
        .graph
        .node_indices()
        .filter(|&index| {
            matches!(plan.graph[index].kind, NodeKind::Literal(_))
                && plan
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
                && predicate.map_or(true, |should_prune| should_prune(index))
        })
        .collect();
    for index in doomed {
        plan.graph.remove_node(index);
    }
}

//! Registry-driven rewriting: staleness analysis and write/read injection.
//!
//! Every stored node is replaced by a write-then-read pair so that
//! consumers observe exactly what the store round-trips. Fresh pairs elide
//! the write, leaving a bare read; stale sourced nodes get a barrier that
//! collects their dependencies ahead of the read.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::pruning::{prune_plan, prune_source_literals};
use crate::errors::{CallError, RunError};
use crate::execution::{
    run_function_on_graph, NodeFailure, PoolError, PoolOptions, QueueStrategy, RetryPolicy,
};
use crate::func::{Signature, SymFn};
use crate::graph::{distinct_predecessors, EdgeKind, Node};
use crate::plan::Plan;
use crate::registry::{Registry, RegistryEntry};
use crate::value::Value;

pub(crate) struct StaleCheckOptions<'a> {
    pub worker_count: usize,
    pub retry: &'a dyn RetryPolicy,
    pub fresh_time: Option<DateTime<Utc>>,
}

struct StaleSlot {
    stale: OnceLock<()>,
    modified_time: OnceLock<Option<DateTime<Utc>>>,
}

impl StaleSlot {
    fn new() -> Self {
        Self {
            stale: OnceLock::new(),
            modified_time: OnceLock::new(),
        }
    }

    fn is_stale(&self) -> bool {
        self.stale.get().is_some()
    }

    fn modified_time(&self) -> Option<DateTime<Utc>> {
        self.modified_time.get().copied().flatten()
    }
}

/// Decide which registry nodes must re-execute.
///
/// Walks the graph in topological order, propagating the maximum stored
/// modified time seen among ancestors. A stored node is stale when its
/// store has no modified time, or when `max(ancestor times, fresh_time)`
/// is strictly newer than its own; equal timestamps are fresh. A sourced
/// node with no timestamped ancestors ignores `fresh_time` (there is no
/// write that could refresh it).
fn stale_nodes(
    plan: &Plan,
    registry: &Registry,
    options: &StaleCheckOptions<'_>,
) -> Result<FxHashSet<NodeIndex>, RunError> {
    let mut working = plan.clone();
    prune_source_literals(
        &mut working,
        Some(&|index| !registry.contains(working_node(plan, index))),
    );

    let slots: FxHashMap<NodeIndex, StaleSlot> = working
        .graph
        .node_indices()
        .map(|index| (index, StaleSlot::new()))
        .collect();

    let working_ref = &working;
    let slots_ref = &slots;
    let process = |index: NodeIndex| -> Result<(), NodeFailure> {
        let slot = &slots_ref[&index];
        let predecessors = distinct_predecessors(&working_ref.graph, index);
        if predecessors.iter().any(|pred| slots_ref[pred].is_stale()) {
            let _ = slot.stale.set(());
            return Ok(());
        }

        let max_ancestor_time = predecessors
            .iter()
            .filter_map(|pred| slots_ref[pred].modified_time())
            .max();
        let Some(entry) = registry.entry(working_node(plan, index)) else {
            let _ = slot.modified_time.set(max_ancestor_time);
            return Ok(());
        };

        let modified_time = crate::execution::retry_loop(
            options.retry,
            || entry.store.get_modified_time(),
            |_attempt| {},
        )
        .map_err(|error| NodeFailure { node: index, error })?;
        let Some(modified_time) = modified_time else {
            let _ = slot.stale.set(());
            return Ok(());
        };

        let applies = max_ancestor_time.is_some() || !entry.is_source;
        let threshold = max_ancestor_time.max(options.fresh_time);
        if applies && threshold.is_some_and(|t| t > modified_time) {
            let _ = slot.stale.set(());
            return Ok(());
        }
        let _ = slot.modified_time.set(Some(modified_time));
        Ok(())
    };

    let result = run_function_on_graph(
        &working.graph,
        &process,
        PoolOptions {
            worker_count: options.worker_count,
            max_errors: Some(1),
            strategy: QueueStrategy::Fifo,
            on_scheduled: None,
        },
    );
    match result {
        Ok(()) => {}
        Err(PoolError::Cycle) => return Err(RunError::Cycle),
        Err(PoolError::Node(failure)) => {
            let data = &working.graph[failure.node];
            return Err(RunError::Call(CallError {
                fn_name: data.label(),
                scope: data.full_scope(),
                call_site: data.call_site,
                source: failure.error,
            }));
        }
    }

    let stale: FxHashSet<NodeIndex> = slots
        .into_iter()
        .filter(|(_, slot)| slot.is_stale())
        .map(|(index, _)| index)
        .collect();
    debug!(stale = stale.len(), "stale check complete");
    Ok(stale)
}

fn working_node(plan: &Plan, index: NodeIndex) -> Node {
    Node {
        lineage: plan.lineage,
        index,
    }
}

fn read_fn(entry: &RegistryEntry) -> SymFn {
    let store = entry.store.clone();
    SymFn::new("read", Signature::new(Vec::new()), move |_| store.read())
}

fn write_fn(entry: &RegistryEntry) -> SymFn {
    let store = entry.store.clone();
    SymFn::new(
        "write",
        Signature::positional(["value"]),
        move |input| {
            let value = input.arg(0).cloned().unwrap_or(Value::Null);
            store.write(&value)?;
            Ok(Value::Null)
        },
    )
}

/// Insert the write/read pair for one registry node and redirect its
/// consumers. Returns the write (or barrier) node, if any, and the read.
fn add_value_store(
    plan: &mut Plan,
    node: Node,
    entry: &RegistryEntry,
    is_stale: bool,
) -> (Option<Node>, Node) {
    let full_scope = plan.graph[node.index].full_scope();
    let out_edges: Vec<(petgraph::stable_graph::EdgeIndex, NodeIndex, EdgeKind)> = plan
        .graph
        .edges_directed(node.index, Direction::Outgoing)
        .map(|edge| (edge.id(), edge.target(), edge.weight().clone()))
        .collect();

    let read = plan.call_with_args(entry.call_site, &read_fn(entry), Vec::new(), Vec::new());
    plan.graph[read.index].scope = full_scope.clone();

    let write = if is_stale {
        let write = if entry.is_source {
            // A barrier collecting the source's dependencies; it has no
            // work of its own.
            let barrier = plan.lit_at(entry.call_site, Value::Null);
            for predecessor in distinct_predecessors(&plan.graph, node.index) {
                plan.graph
                    .add_edge(predecessor, barrier.index, EdgeKind::Dependency);
            }
            barrier
        } else {
            plan.call_with_args(entry.call_site, &write_fn(entry), vec![node], Vec::new())
        };
        plan.graph[write.index].scope = full_scope;
        plan.graph
            .add_edge(write.index, read.index, EdgeKind::Dependency);
        Some(write)
    } else {
        None
    };

    for (edge, target, kind) in out_edges {
        plan.graph.remove_edge(edge);
        if kind.is_value() {
            plan.graph.add_edge(read.index, target, kind);
        } else if let Some(write) = write {
            plan.graph.add_edge(write.index, target, EdgeKind::Dependency);
        }
    }

    (write, read)
}

/// Rewrite the logical plan into a physical plan against the registry.
///
/// Returns the physical plan and the redirected output node: if the
/// requested output is itself stored, consumers (and the caller) receive
/// the read node's value.
pub(crate) fn plan_with_value_stores(
    plan: &Plan,
    registry: &Registry,
    output: Option<Node>,
    options: &StaleCheckOptions<'_>,
) -> Result<(Plan, Option<Node>), RunError> {
    for (node, _) in registry.entries() {
        plan.check_node(node).map_err(RunError::Plan)?;
    }

    let stale = stale_nodes(plan, registry, options)?;
    let mut physical = plan.clone();

    let mut read_lookup: FxHashMap<Node, Node> = FxHashMap::default();
    let mut required: Vec<Node> = Vec::new();
    for (node, entry) in registry.entries() {
        let is_stale = stale.contains(&node.index);
        let (write, read) = add_value_store(&mut physical, node, entry, is_stale);
        if let Some(write) = write {
            required.push(write);
        }
        read_lookup.insert(node, read);
    }

    let output = output.map(|node| read_lookup.get(&node).copied().unwrap_or(node));
    prune_plan(&mut physical, required, output);
    debug!(
        nodes = physical.graph.node_count(),
        "physical plan prepared"
    );
    Ok((physical, output))
}

/// Rewrite every registry node as if it were stale, without querying any
/// store and without pruning. Rendering uses this to show the complete
/// physical structure with no I/O.
pub(crate) fn plan_with_value_stores_unpruned(
    plan: &Plan,
    registry: &Registry,
) -> Result<Plan, RunError> {
    for (node, _) in registry.entries() {
        plan.check_node(node).map_err(RunError::Plan)?;
    }
    let mut physical = plan.clone();
    for (node, entry) in registry.entries() {
        add_value_store(&mut physical, node, entry, true);
    }
    Ok(physical)
}

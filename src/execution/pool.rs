//! Runs a function over a graph in parallel, in topological order.
//!
//! A pool of worker threads pulls ready nodes from a shared queue; a node
//! becomes ready when its last distinct predecessor completes. Failures are
//! tolerated up to an error bound: the first failure is captured for the
//! caller, successors of failed nodes are never admitted, and once the
//! bound is exceeded no new work starts while in-flight work finishes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::greedy::priority_mapping;
use super::queue::{QueueStrategy, ReadyQueue, Task};
use crate::graph::{
    assert_acyclic, distinct_successors, predecessor_count, source_nodes, PlanGraph,
};

/// A node evaluation failed after exhausting its retry policy.
pub(crate) struct NodeFailure {
    pub node: NodeIndex,
    pub error: anyhow::Error,
}

pub(crate) enum PoolError {
    Cycle,
    Node(NodeFailure),
}

pub(crate) struct PoolOptions<'a> {
    pub worker_count: usize,
    pub max_errors: Option<u32>,
    pub strategy: QueueStrategy,
    pub on_scheduled: Option<&'a (dyn Fn(NodeIndex) + Sync)>,
}

/// The worker count used when the caller does not specify one.
pub(crate) fn default_worker_count() -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores + 4).min(32)
}

struct FailureState {
    first: Option<NodeFailure>,
    count: u32,
}

pub(crate) fn run_function_on_graph(
    graph: &PlanGraph,
    process: &(dyn Fn(NodeIndex) -> Result<(), NodeFailure> + Sync),
    options: PoolOptions<'_>,
) -> Result<(), PoolError> {
    assert_acyclic(graph).map_err(|_| PoolError::Cycle)?;
    let worker_count = options.worker_count.max(1);

    let queue = match options.strategy {
        QueueStrategy::Fifo => ReadyQueue::fifo(),
        QueueStrategy::Random => ReadyQueue::random(),
        QueueStrategy::Priority => ReadyQueue::priority(priority_mapping(graph)),
    };
    let remaining: FxHashMap<NodeIndex, AtomicUsize> = graph
        .node_indices()
        .map(|node| (node, AtomicUsize::new(predecessor_count(graph, node))))
        .collect();
    let stop = AtomicBool::new(false);
    let failures = Mutex::new(FailureState {
        first: None,
        count: 0,
    });

    let submit = |node: NodeIndex| {
        if let Some(on_scheduled) = options.on_scheduled {
            on_scheduled(node);
        }
        queue.put(Task::Run(node));
    };

    let process_node = |node: NodeIndex| {
        if stop.load(Ordering::Acquire) {
            return;
        }
        match process(node) {
            Err(failure) => {
                let mut state = failures.lock();
                state.count += 1;
                if state.first.is_none() {
                    state.first = Some(failure);
                }
                if let Some(max_errors) = options.max_errors {
                    if state.count >= max_errors {
                        stop.store(true, Ordering::Release);
                    }
                }
            }
            Ok(()) => {
                for successor in distinct_successors(graph, node) {
                    let count = &remaining[&successor];
                    if count.fetch_sub(1, Ordering::AcqRel) == 1 {
                        submit(successor);
                    }
                }
            }
        }
    };

    thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                match queue.get() {
                    Task::Shutdown => {
                        queue.task_done();
                        return;
                    }
                    Task::Run(node) => {
                        process_node(node);
                        queue.task_done();
                    }
                }
            });
        }

        for node in source_nodes(graph) {
            submit(node);
        }
        queue.join();
        stop.store(true, Ordering::Release);
        for _ in 0..worker_count {
            queue.put(Task::Shutdown);
        }
    });

    let state = failures.into_inner();
    if state.count > 0 {
        debug!(errors = state.count, "graph run recorded failures");
    }
    match state.first {
        Some(first) => Err(PoolError::Node(first)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::CallSite;
    use crate::func::SymFn;
    use crate::graph::{EdgeKind, NodeData, NodeKind};
    use crate::value::Value;
    use std::collections::HashSet;

    fn call(graph: &mut PlanGraph, name: &str) -> NodeIndex {
        graph.add_node(NodeData {
            kind: NodeKind::Call(SymFn::nullary(name, || Ok(Value::Null))),
            scope: Vec::new(),
            implicit_scope: Vec::new(),
            call_site: CallSite::capture(),
        })
    }

    fn options(max_errors: Option<u32>) -> PoolOptions<'static> {
        PoolOptions {
            worker_count: 4,
            max_errors,
            strategy: QueueStrategy::Fifo,
            on_scheduled: None,
        }
    }

    #[test]
    fn every_node_runs_exactly_once_in_dependency_order() {
        let mut graph = PlanGraph::default();
        let a = call(&mut graph, "a");
        let b = call(&mut graph, "b");
        let c = call(&mut graph, "c");
        graph.add_edge(a, b, EdgeKind::Positional { index: 0 });
        graph.add_edge(a, c, EdgeKind::Dependency);
        graph.add_edge(b, c, EdgeKind::Dependency);

        let order = Mutex::new(Vec::new());
        run_function_on_graph(
            &graph,
            &|node| {
                order.lock().push(node);
                Ok(())
            },
            options(Some(1)),
        )
        .map_err(|_| "failed")
        .expect("run");

        let order = order.into_inner();
        assert_eq!(order.len(), 3);
        let position = |node| order.iter().position(|&n| n == node).expect("ran");
        assert!(position(a) < position(b));
        assert!(position(b) < position(c));
    }

    #[test]
    fn failures_skip_successors_but_not_independent_work() {
        let mut graph = PlanGraph::default();
        let bad = call(&mut graph, "bad");
        let child = call(&mut graph, "child");
        let independent = call(&mut graph, "independent");
        graph.add_edge(bad, child, EdgeKind::Dependency);

        let ran = Mutex::new(HashSet::new());
        let result = run_function_on_graph(
            &graph,
            &|node| {
                ran.lock().insert(node);
                if node == bad {
                    return Err(NodeFailure {
                        node,
                        error: anyhow::anyhow!("boom"),
                    });
                }
                Ok(())
            },
            options(None),
        );

        let ran = ran.into_inner();
        assert!(ran.contains(&independent));
        assert!(!ran.contains(&child));
        match result {
            Err(PoolError::Node(failure)) => assert_eq!(failure.node, bad),
            _ => panic!("expected the failure to surface"),
        }
    }

    #[test]
    fn exceeding_the_error_limit_stops_admission() {
        // A wide layer of failing roots with one successor each; with the
        // limit at one, most successors never become ready anyway, but the
        // stop flag must also keep admitted roots from running.
        let mut graph = PlanGraph::default();
        let roots: Vec<NodeIndex> = (0..64).map(|i| call(&mut graph, &format!("r{i}"))).collect();

        let ran = AtomicUsize::new(0);
        let result = run_function_on_graph(
            &graph,
            &|_node| {
                ran.fetch_add(1, Ordering::SeqCst);
                Err(NodeFailure {
                    node: roots[0],
                    error: anyhow::anyhow!("boom"),
                })
            },
            PoolOptions {
                worker_count: 2,
                max_errors: Some(1),
                strategy: QueueStrategy::Fifo,
                on_scheduled: None,
            },
        );
        assert!(matches!(result, Err(PoolError::Node(_))));
        assert!(ran.load(Ordering::SeqCst) < 64);
    }

    #[test]
    fn cycles_are_rejected_before_any_work_runs() {
        let mut graph = PlanGraph::default();
        let a = call(&mut graph, "a");
        let b = call(&mut graph, "b");
        graph.add_edge(a, b, EdgeKind::Dependency);
        graph.add_edge(b, a, EdgeKind::Dependency);

        let result = run_function_on_graph(&graph, &|_| Ok(()), options(Some(1)));
        assert!(matches!(result, Err(PoolError::Cycle)));
    }

    #[test]
    fn empty_graphs_complete_immediately() {
        let graph = PlanGraph::default();
        assert!(run_function_on_graph(&graph, &|_| Ok(()), options(Some(1))).is_ok());
    }
}

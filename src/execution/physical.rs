//! Evaluation of a physical plan across the worker pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::pool::{default_worker_count, run_function_on_graph, NodeFailure, PoolError, PoolOptions};
use super::queue::QueueStrategy;
use super::{retry_loop, RetryPolicy, Scheduler};
use crate::errors::{CallError, RunError};
use crate::func::{CallInput, SymFn};
use crate::graph::{argument_nodes, Node, NodeKind, PlanGraph};
use crate::plan::Plan;
use crate::progress::{ProgressObserver, TaskInfo};
use crate::transform::prune_source_literals;
use crate::value::Value;

pub(crate) struct ExecOptions<'a> {
    pub worker_count: Option<usize>,
    pub max_errors: Option<u32>,
    pub retry: &'a dyn RetryPolicy,
    pub observer: &'a dyn ProgressObserver,
    pub scheduler: Scheduler,
}

type ResultSlot = Mutex<Option<Value>>;

/// A call bound to the result slots of its arguments.
///
/// Bound calls hold the only long-lived references to argument values:
/// once every consumer has been evaluated and its bound call dropped, the
/// producer's value is released.
struct BoundCall {
    args: Vec<Arc<ResultSlot>>,
    kwargs: Vec<(String, Arc<ResultSlot>)>,
    result: Arc<ResultSlot>,
}

impl BoundCall {
    fn input(&self) -> CallInput {
        CallInput {
            args: self
                .args
                .iter()
                .map(|slot| slot.lock().clone().expect("argument value is available"))
                .collect(),
            kwargs: self
                .kwargs
                .iter()
                .map(|(name, slot)| {
                    (
                        name.clone(),
                        slot.lock().clone().expect("argument value is available"),
                    )
                })
                .collect(),
        }
    }
}

fn build_bound_calls(
    graph: &PlanGraph,
    output: Option<Node>,
) -> (
    FxHashMap<NodeIndex, Mutex<Option<BoundCall>>>,
    Option<Arc<ResultSlot>>,
) {
    let slots: FxHashMap<NodeIndex, Arc<ResultSlot>> = graph
        .node_indices()
        .map(|index| {
            let initial = match &graph[index].kind {
                NodeKind::Literal(value) => Some(value.clone()),
                NodeKind::Call(_) => None,
            };
            (index, Arc::new(Mutex::new(initial)))
        })
        .collect();

    let bound_calls = graph
        .node_indices()
        .filter(|&index| graph[index].is_call())
        .map(|index| {
            let (args, kwargs) = argument_nodes(graph, index);
            let bound = BoundCall {
                args: args.into_iter().map(|arg| slots[&arg].clone()).collect(),
                kwargs: kwargs
                    .into_iter()
                    .map(|(name, arg)| (name, slots[&arg].clone()))
                    .collect(),
                result: slots[&index].clone(),
            };
            (index, Mutex::new(Some(bound)))
        })
        .collect();

    let output_slot = output.map(|node| slots[&node.index].clone());
    (bound_calls, output_slot)
}

fn invoke_guarded(func: &SymFn, input: CallInput) -> anyhow::Result<Value> {
    match catch_unwind(AssertUnwindSafe(|| func.invoke(input))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic in symbolic call".to_string());
            Err(anyhow::anyhow!("{message}"))
        }
    }
}

struct ScopeState {
    remaining: usize,
    entered: bool,
    exited: bool,
}

/// Tracks when each scope's first node starts and last node completes.
struct ScopeTracker {
    states: Mutex<FxHashMap<Vec<String>, ScopeState>>,
}

impl ScopeTracker {
    fn new(graph: &PlanGraph) -> Self {
        let mut states: FxHashMap<Vec<String>, ScopeState> = FxHashMap::default();
        for index in graph.node_indices() {
            if graph[index].is_call() {
                states
                    .entry(graph[index].full_scope())
                    .or_insert(ScopeState {
                        remaining: 0,
                        entered: false,
                        exited: false,
                    })
                    .remaining += 1;
            }
        }
        Self {
            states: Mutex::new(states),
        }
    }

    fn started(&self, scope: &[String], observer: &dyn ProgressObserver) {
        let should_enter = {
            let mut states = self.states.lock();
            match states.get_mut(scope) {
                Some(state) if !state.entered => {
                    state.entered = true;
                    true
                }
                _ => false,
            }
        };
        if should_enter {
            observer.scope_entered(scope);
        }
    }

    fn completed(&self, scope: &[String], observer: &dyn ProgressObserver) {
        let should_exit = {
            let mut states = self.states.lock();
            match states.get_mut(scope) {
                Some(state) => {
                    state.remaining = state.remaining.saturating_sub(1);
                    if state.remaining == 0 && !state.exited {
                        state.exited = true;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if should_exit {
            observer.scope_exited(scope);
        }
    }

    /// Exit scopes whose remaining nodes were skipped.
    fn finish(&self, observer: &dyn ProgressObserver) {
        let pending: Vec<Vec<String>> = {
            let mut states = self.states.lock();
            states
                .iter_mut()
                .filter(|(_, state)| state.entered && !state.exited)
                .map(|(scope, state)| {
                    state.exited = true;
                    scope.clone()
                })
                .collect()
        };
        for scope in pending {
            observer.scope_exited(&scope);
        }
    }
}

fn make_call_error(graph: &PlanGraph, index: NodeIndex, source: anyhow::Error) -> CallError {
    let data = &graph[index];
    CallError {
        fn_name: data.label(),
        scope: data.full_scope(),
        call_site: data.call_site,
        source,
    }
}

pub(crate) fn run_physical(
    mut plan: Plan,
    output: Option<Node>,
    options: &ExecOptions<'_>,
) -> Result<Option<Value>, RunError> {
    let (bound_calls, output_slot) = build_bound_calls(&plan.graph, output);
    prune_source_literals(&mut plan, None);

    let observer = options.observer;
    let tracker = ScopeTracker::new(&plan.graph);
    let plan_ref = &plan;

    debug!(
        nodes = plan.graph.node_count(),
        edges = plan.graph.edge_count(),
        "running physical plan"
    );

    let process = |index: NodeIndex| -> Result<(), NodeFailure> {
        let data = &plan_ref.graph[index];
        let NodeKind::Call(func) = &data.kind else {
            return Ok(());
        };
        let scope = data.full_scope();
        let task = TaskInfo {
            node: plan_ref.node(index),
            name: func.name(),
            scope: &scope,
        };
        tracker.started(&scope, observer);
        observer.started(&task);

        let bound = bound_calls[&index]
            .lock()
            .take()
            .expect("bound call is evaluated once");
        let outcome = retry_loop(
            options.retry,
            || invoke_guarded(func, bound.input()),
            |attempt| observer.retrying(&task, attempt),
        );
        match outcome {
            Ok(value) => {
                *bound.result.lock() = Some(value);
                observer.succeeded(&task);
                tracker.completed(&scope, observer);
                Ok(())
            }
            Err(error) => {
                let call_error = make_call_error(&plan_ref.graph, index, error);
                observer.failed(&task, &call_error);
                tracker.completed(&scope, observer);
                Err(NodeFailure {
                    node: index,
                    error: anyhow::Error::new(call_error),
                })
            }
        }
    };

    let on_scheduled = |index: NodeIndex| {
        let data = &plan_ref.graph[index];
        if let NodeKind::Call(func) = &data.kind {
            let scope = data.full_scope();
            observer.scheduled(&TaskInfo {
                node: plan_ref.node(index),
                name: func.name(),
                scope: &scope,
            });
        }
    };

    let result = run_function_on_graph(
        &plan.graph,
        &process,
        PoolOptions {
            worker_count: options.worker_count.unwrap_or_else(default_worker_count),
            max_errors: options.max_errors,
            strategy: match options.scheduler {
                Scheduler::Greedy => QueueStrategy::Priority,
                Scheduler::Random => QueueStrategy::Random,
            },
            on_scheduled: Some(&on_scheduled),
        },
    );
    tracker.finish(observer);

    match result {
        Ok(()) => Ok(output_slot.and_then(|slot| slot.lock().take())),
        Err(PoolError::Cycle) => Err(RunError::Cycle),
        Err(PoolError::Node(failure)) => {
            let error = match failure.error.downcast::<CallError>() {
                Ok(call_error) => call_error,
                Err(other) => make_call_error(&plan.graph, failure.node, other),
            };
            Err(RunError::Call(error))
        }
    }
}

//! Entry points for executing a plan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::RunError;
use crate::execution::{run_physical, ExecOptions, LimitedAttempts, RetryPolicy, Scheduler};
use crate::graph::Node;
use crate::plan::{Plan, Sym};
use crate::progress::{NullObserver, ProgressObserver};
use crate::registry::Registry;
use crate::transform::{plan_with_value_stores, prune_plan, StaleCheckOptions};
use crate::value::Value;

/// Tunables for [`run`] and [`dry_run`].
#[derive(Clone)]
pub struct RunOptions {
    /// Worker threads for evaluation. Defaults to a small multiple of the
    /// available parallelism, capped at 32.
    pub max_workers: Option<usize>,
    /// Errors tolerated before new work stops being admitted; `None` runs
    /// as much of the plan as possible.
    pub max_errors: Option<u32>,
    /// Wraps every call and store operation.
    pub retry: Arc<dyn RetryPolicy>,
    /// Stored values strictly older than this are treated as absent.
    pub fresh_time: Option<DateTime<Utc>>,
    /// Receives scheduler events; compose several with
    /// [`crate::progress::CompositeObserver`].
    pub progress: Arc<dyn ProgressObserver>,
    pub scheduler: Scheduler,
    /// Worker threads for the stale check; defaults to `max_workers`.
    pub stale_check_max_workers: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            max_errors: Some(1),
            retry: Arc::new(LimitedAttempts::default()),
            fresh_time: None,
            progress: Arc::new(NullObserver),
            scheduler: Scheduler::default(),
            stale_check_max_workers: None,
        }
    }
}

impl RunOptions {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_max_errors(mut self, max_errors: Option<u32>) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_retry(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempts(self, attempts: u32) -> Self {
        self.with_retry(Arc::new(LimitedAttempts::new(attempts)))
    }

    pub fn with_fresh_time(mut self, fresh_time: DateTime<Utc>) -> Self {
        self.fresh_time = Some(fresh_time);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }
}

fn prepare(
    plan: &Plan,
    registry: Option<&Registry>,
    output: Option<Sym>,
    options: &RunOptions,
) -> Result<(Plan, Option<Node>), RunError> {
    let mut plan = plan.clone();
    let output_node = output.map(|value| plan.gather(value));

    match registry {
        Some(registry) if !registry.is_empty() => {
            let stale_options = StaleCheckOptions {
                worker_count: options
                    .stale_check_max_workers
                    .or(options.max_workers)
                    .unwrap_or_else(crate::execution::default_worker_count),
                retry: options.retry.as_ref(),
                fresh_time: options.fresh_time,
            };
            plan_with_value_stores(&plan, registry, output_node, &stale_options)
        }
        _ => {
            prune_plan(&mut plan, [], output_node);
            Ok((plan, output_node))
        }
    }
}

/// Run a plan, returning the requested output.
///
/// Ensures every store in the registry is brought up to date. When calls
/// fail, the run waits until no calls are in flight and either no calls
/// remain or the error limit has been exceeded, then raises the first
/// recorded error; the progress observer sees every failure.
pub fn run(
    plan: &Plan,
    registry: Option<&Registry>,
    output: Option<Sym>,
    options: &RunOptions,
) -> Result<Option<Value>, RunError> {
    let (physical, output_node) = prepare(plan, registry, output, options)?;
    debug!(
        nodes = physical.node_count(),
        edges = physical.edge_count(),
        "plan transformed"
    );
    run_physical(
        physical,
        output_node,
        &ExecOptions {
            worker_count: options.max_workers,
            max_errors: options.max_errors,
            retry: options.retry.as_ref(),
            observer: options.progress.as_ref(),
            scheduler: options.scheduler,
        },
    )
}

/// Build and return the pruned physical plan without executing it.
///
/// The returned node is the redirected output: if the requested output is
/// stored, it points at the injected read node.
pub fn dry_run(
    plan: &Plan,
    registry: Option<&Registry>,
    output: Option<Sym>,
    options: &RunOptions,
) -> Result<(Plan, Option<Node>), RunError> {
    prepare(plan, registry, output, options)
}

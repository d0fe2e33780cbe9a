//! Progress observation for plan runs.
//!
//! The scheduler invokes observers from worker threads; implementations
//! must be thread-safe. The grouping key for progress displays is a node's
//! scope, not its identity.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::CallError;
use crate::graph::Node;

/// A node as seen by progress callbacks.
#[derive(Debug, Clone)]
pub struct TaskInfo<'a> {
    pub node: Node,
    pub name: &'a str,
    pub scope: &'a [String],
}

/// Receives scheduler events for a single run.
///
/// All methods have empty default bodies, so observers implement only what
/// they care about. Every method may be invoked from any worker thread.
#[allow(unused_variables)]
pub trait ProgressObserver: Send + Sync {
    /// The first node of `scope` is about to start.
    fn scope_entered(&self, scope: &[String]) {}

    /// Every node of `scope` has completed (or the run drained).
    fn scope_exited(&self, scope: &[String]) {}

    /// The node was admitted to the ready queue.
    fn scheduled(&self, task: &TaskInfo<'_>) {}

    /// A worker began evaluating the node.
    fn started(&self, task: &TaskInfo<'_>) {}

    fn succeeded(&self, task: &TaskInfo<'_>) {}

    fn failed(&self, task: &TaskInfo<'_>, error: &CallError) {}

    /// The node failed and is about to be attempted again.
    fn retrying(&self, task: &TaskInfo<'_>, attempt: u32) {}
}

/// An observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// Fans events out to multiple observers in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        Self { observers }
    }
}

impl ProgressObserver for CompositeObserver {
    fn scope_entered(&self, scope: &[String]) {
        for observer in &self.observers {
            observer.scope_entered(scope);
        }
    }

    fn scope_exited(&self, scope: &[String]) {
        for observer in &self.observers {
            observer.scope_exited(scope);
        }
    }

    fn scheduled(&self, task: &TaskInfo<'_>) {
        for observer in &self.observers {
            observer.scheduled(task);
        }
    }

    fn started(&self, task: &TaskInfo<'_>) {
        for observer in &self.observers {
            observer.started(task);
        }
    }

    fn succeeded(&self, task: &TaskInfo<'_>) {
        for observer in &self.observers {
            observer.succeeded(task);
        }
    }

    fn failed(&self, task: &TaskInfo<'_>, error: &CallError) {
        for observer in &self.observers {
            observer.failed(task, error);
        }
    }

    fn retrying(&self, task: &TaskInfo<'_>, attempt: u32) {
        for observer in &self.observers {
            observer.retrying(task, attempt);
        }
    }
}

/// Emits progress as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn scope_entered(&self, scope: &[String]) {
        info!(scope = scope.join("/"), "scope entered");
    }

    fn scope_exited(&self, scope: &[String]) {
        info!(scope = scope.join("/"), "scope exited");
    }

    fn started(&self, task: &TaskInfo<'_>) {
        debug!(name = task.name, scope = task.scope.join("/"), "call started");
    }

    fn succeeded(&self, task: &TaskInfo<'_>) {
        debug!(name = task.name, scope = task.scope.join("/"), "call succeeded");
    }

    fn failed(&self, task: &TaskInfo<'_>, error: &CallError) {
        warn!(
            name = task.name,
            scope = task.scope.join("/"),
            error = %error.source,
            "call failed"
        );
    }

    fn retrying(&self, task: &TaskInfo<'_>, attempt: u32) {
        info!(name = task.name, attempt, "retrying call");
    }
}

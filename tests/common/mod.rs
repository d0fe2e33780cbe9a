//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uberjob::progress::{ProgressObserver, TaskInfo};
use uberjob::{CallError, SymFn, Value};

/// A binary add over ints.
pub fn add_fn() -> SymFn {
    SymFn::binary("add", ["a", "b"], |a, b| {
        Ok(Value::Int(int(&a)? + int(&b)?))
    })
}

/// A binary multiply over ints.
pub fn mul_fn() -> SymFn {
    SymFn::binary("mul", ["a", "b"], |a, b| {
        Ok(Value::Int(int(&a)? * int(&b)?))
    })
}

fn int(value: &Value) -> anyhow::Result<i64> {
    value
        .as_int()
        .ok_or_else(|| anyhow::anyhow!("expected an int, got {}", value.compact()))
}

/// An add that also counts how many times it actually ran.
pub fn counting_add(counter: Arc<AtomicUsize>) -> SymFn {
    SymFn::binary("add", ["a", "b"], move |a, b| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(int(&a)? + int(&b)?))
    })
}

/// A multiply that counts its executions.
pub fn counting_mul(counter: Arc<AtomicUsize>) -> SymFn {
    SymFn::binary("mul", ["a", "b"], move |a, b| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(int(&a)? * int(&b)?))
    })
}

/// Records every scheduler event for later assertions.
#[derive(Default)]
pub struct CollectingObserver {
    pub scheduled: AtomicUsize,
    pub started: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub retrying: AtomicUsize,
    pub scopes_entered: Mutex<Vec<Vec<String>>>,
    pub scopes_exited: Mutex<Vec<Vec<String>>>,
}

impl CollectingObserver {
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }
}

impl ProgressObserver for CollectingObserver {
    fn scope_entered(&self, scope: &[String]) {
        self.scopes_entered.lock().push(scope.to_vec());
    }

    fn scope_exited(&self, scope: &[String]) {
        self.scopes_exited.lock().push(scope.to_vec());
    }

    fn scheduled(&self, _task: &TaskInfo<'_>) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }

    fn started(&self, _task: &TaskInfo<'_>) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn succeeded(&self, _task: &TaskInfo<'_>) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, _task: &TaskInfo<'_>, _error: &CallError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn retrying(&self, _task: &TaskInfo<'_>, _attempt: u32) {
        self.retrying.fetch_add(1, Ordering::SeqCst);
    }
}

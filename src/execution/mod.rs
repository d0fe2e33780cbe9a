//! Parallel execution of physical plans.

mod greedy;
mod physical;
mod pool;
mod queue;

pub(crate) use physical::{run_physical, ExecOptions};
pub(crate) use pool::{
    default_worker_count, run_function_on_graph, NodeFailure, PoolError, PoolOptions,
};
pub(crate) use queue::QueueStrategy;

/// Chooses which ready node a worker picks up next.
///
/// This affects only throughput and memory pressure, never results: any
/// strategy observes the same happens-before edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduler {
    /// Finish parts of the plan before starting others, by prioritizing
    /// each pseudo-sink and its ancestors in topological order.
    #[default]
    Greedy,
    /// Pick a uniformly random ready node.
    Random,
}

/// Decides whether a failed unit of work should be attempted again.
///
/// The policy wraps user calls and store operations alike; an error only
/// counts against the run's error limit once the policy gives up.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn should_retry(&self, attempt: u32, error: &anyhow::Error) -> bool;
}

/// Attempts each unit of work a fixed number of times.
#[derive(Debug, Clone, Copy)]
pub struct LimitedAttempts {
    attempts: u32,
}

impl LimitedAttempts {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }
}

impl Default for LimitedAttempts {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy for LimitedAttempts {
    fn should_retry(&self, attempt: u32, _error: &anyhow::Error) -> bool {
        attempt < self.attempts
    }
}

pub(crate) fn retry_loop<T>(
    policy: &dyn RetryPolicy,
    mut attempt_fn: impl FnMut() -> anyhow::Result<T>,
    mut on_retry: impl FnMut(u32),
) -> anyhow::Result<T> {
    let mut attempt = 1u32;
    loop {
        match attempt_fn() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if policy.should_retry(attempt, &error) {
                    attempt += 1;
                    on_retry(attempt);
                } else {
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_attempts_retries_until_exhausted() {
        let policy = LimitedAttempts::new(3);
        let mut calls = 0u32;
        let mut retries = Vec::new();
        let result: anyhow::Result<()> = retry_loop(
            &policy,
            || {
                calls += 1;
                anyhow::bail!("always fails")
            },
            |attempt| retries.push(attempt),
        );
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(retries, vec![2, 3]);
    }

    #[test]
    fn retry_loop_returns_the_first_success() {
        let policy = LimitedAttempts::new(3);
        let mut calls = 0u32;
        let result = retry_loop(
            &policy,
            || {
                calls += 1;
                if calls < 2 {
                    anyhow::bail!("flaky")
                }
                Ok(calls)
            },
            |_| {},
        );
        assert_eq!(result.expect("succeeds"), 2);
    }
}

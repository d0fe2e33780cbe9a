//! Error types surfaced while building and running plans.

use crate::call_site::CallSite;
use crate::func::BindError;

/// A plan or registry construction error, raised synchronously.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{fn_name} is not callable with the given arguments: {source}")]
    SignatureMismatch {
        fn_name: String,
        #[source]
        source: BindError,
    },
    #[error("the plan does not contain the given node")]
    UnknownNode,
    #[error("the node belongs to a different plan")]
    ForeignPlan,
    #[error("the node already has a value store")]
    DuplicateStore,
}

/// A failure while transforming or executing a plan.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("the plan contains a cycle")]
    Cycle,
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// An error was raised in a symbolic call.
///
/// Carries the failing node's function name, scope, and construction site;
/// the original error is preserved as the source.
#[derive(Debug, thiserror::Error)]
#[error("an error was raised in a symbolic call to {fn_name}\nsymbolic call site: {call_site}")]
pub struct CallError {
    pub fn_name: String,
    pub scope: Vec<String>,
    pub call_site: CallSite,
    #[source]
    pub source: anyhow::Error,
}

/// A sourced placeholder was invoked directly.
///
/// This means a node was added to a plan via `Registry::source`, but the
/// registry was not passed to `run`, so the placeholder was never rewritten
/// into a store read.
#[derive(Debug, thiserror::Error)]
#[error("a source node was created via a Registry, but that Registry was not passed to run")]
pub struct NotTransformedError;

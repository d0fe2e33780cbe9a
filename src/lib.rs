//! uberjob builds and runs symbolic call graphs.
//!
//! A [`Plan`] is a graph of deferred function calls and literal values. An
//! optional [`Registry`] maps plan nodes to [`ValueStore`]s, persistent
//! locations with externally observable modified times. Running a plan
//! executes only what is necessary to materialize a requested output,
//! reusing stored values that are still fresh and rebuilding stale ones in
//! parallel across a worker pool.
//!
//! ```no_run
//! use uberjob::{run, Plan, RunOptions, Sym, SymFn, Value};
//!
//! let add = SymFn::binary("add", ["a", "b"], |a, b| {
//!     Ok(Value::Int(a.as_int().unwrap_or(0) + b.as_int().unwrap_or(0)))
//! });
//!
//! let mut plan = Plan::new();
//! let x = plan.call(&add, [Sym::from(1), Sym::from(2)])?;
//! let result = run(&plan, None, Some(Sym::from(x)), &RunOptions::default())?;
//! assert_eq!(result, Some(Value::Int(3)));
//! # Ok::<(), anyhow::Error>(())
//! ```

mod builtins;
mod call_site;
mod errors;
mod execution;
mod func;
mod graph;
mod plan;
mod registry;
mod render;
mod run;
mod store;
mod transform;
mod value;

pub mod progress;
pub mod stores;

pub use call_site::CallSite;
pub use errors::{CallError, NotTransformedError, PlanError, RunError};
pub use execution::{LimitedAttempts, RetryPolicy, Scheduler};
pub use func::{BindError, CallInput, Param, Signature, SymFn};
pub use graph::{EdgeKind, Node};
pub use plan::{CallArgs, Plan, Sym};
pub use registry::Registry;
pub use render::{render_dot, render_image, RenderOptions};
pub use run::{dry_run, run, RunOptions};
pub use store::ValueStore;
pub use value::Value;

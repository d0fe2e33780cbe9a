//! Logical-to-physical plan rewriting.

mod caching;
mod pruning;

pub(crate) use caching::{
    plan_with_value_stores, plan_with_value_stores_unpruned, StaleCheckOptions,
};
pub(crate) use pruning::{prune_plan, prune_source_literals};

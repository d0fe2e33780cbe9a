//! The value-store contract consumed by the scheduler.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::value::Value;

/// A persistent, externally timestamped location for a single value.
///
/// The core treats stores as opaque and may invoke them from worker
/// threads; implementations must be thread-safe. A `write` followed by a
/// `read` must round-trip the value through whatever serialization the
/// store uses: the scheduler routes consumers through `read`, so lossy
/// serialization is observed consistently whether the value was just
/// built or reloaded on a later run.
pub trait ValueStore: fmt::Debug + Send + Sync {
    /// Read the stored value.
    fn read(&self) -> anyhow::Result<Value>;

    /// Write a value to the store.
    fn write(&self, value: &Value) -> anyhow::Result<()>;

    /// The modified time of the stored value, or `None` if no stored value
    /// exists.
    fn get_modified_time(&self) -> anyhow::Result<Option<DateTime<Utc>>>;
}

//! A fully controllable in-memory store for tests.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use anyhow::bail;

use crate::store::ValueStore;
use crate::value::Value;

#[derive(Debug, Default)]
struct TestStoreState {
    value: Option<Value>,
    modified_time: Option<DateTime<Utc>>,
    read_count: usize,
    write_count: usize,
}

/// An in-memory value store that counts reads and writes and can be told
/// to fail on demand. Intended for tests; shared between a registry and a
/// test through `Arc`.
#[derive(Debug, Default)]
pub struct TestStore {
    state: Mutex<TestStoreState>,
    can_read: bool,
    can_write: bool,
    can_get_modified_time: bool,
}

impl TestStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TestStoreState::default()),
            can_read: true,
            can_write: true,
            can_get_modified_time: true,
        }
    }

    /// A store holding `value`, modified now.
    pub fn with_value(value: impl Into<Value>) -> Self {
        let store = Self::new();
        store.set_value(value);
        store
    }

    /// A store holding `value` with an explicit modified time.
    pub fn with_value_at(value: impl Into<Value>, modified_time: DateTime<Utc>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            state.value = Some(value.into());
            state.modified_time = Some(modified_time);
        }
        store
    }

    pub fn deny_read(mut self) -> Self {
        self.can_read = false;
        self
    }

    pub fn deny_write(mut self) -> Self {
        self.can_write = false;
        self
    }

    pub fn deny_get_modified_time(mut self) -> Self {
        self.can_get_modified_time = false;
        self
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        let mut state = self.state.lock();
        state.value = Some(value.into());
        state.modified_time = Some(Utc::now());
    }

    pub fn set_modified_time(&self, modified_time: DateTime<Utc>) {
        self.state.lock().modified_time = Some(modified_time);
    }

    /// Drop the stored value, as if the backing file were deleted.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.value = None;
        state.modified_time = None;
    }

    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().read_count
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().write_count
    }
}

impl ValueStore for TestStore {
    fn read(&self) -> anyhow::Result<Value> {
        if !self.can_read {
            bail!("this test store cannot read");
        }
        let mut state = self.state.lock();
        state.read_count += 1;
        match &state.value {
            Some(value) => Ok(value.clone()),
            None => bail!("failed to read value from empty store"),
        }
    }

    fn write(&self, value: &Value) -> anyhow::Result<()> {
        if !self.can_write {
            bail!("this test store cannot write");
        }
        let mut state = self.state.lock();
        state.write_count += 1;
        state.value = Some(value.clone());
        state.modified_time = Some(Utc::now());
        Ok(())
    }

    fn get_modified_time(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        if !self.can_get_modified_time {
            bail!("this test store cannot get the modified time");
        }
        Ok(self.state.lock().modified_time)
    }
}

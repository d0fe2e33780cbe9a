//! A value store persisting a JSON document.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};

use super::file::{get_modified_time, staged_write};
use crate::store::ValueStore;
use crate::value::Value;

/// Stores a JSON-representable value in a file.
///
/// The round trip is lossy where JSON is: tuples and sets come back as
/// lists, and map keys must be strings. Consumers of a stored node observe
/// exactly what `read` returns.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ValueStore for JsonFileStore {
    fn read(&self) -> anyhow::Result<Value> {
        let file = fs::File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let json: serde_json::Value = serde_json::from_reader(file)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Value::from_json(&json))
    }

    fn write(&self, value: &Value) -> anyhow::Result<()> {
        let json = value.to_json()?;
        staged_write(&self.path, |writer| {
            serde_json::to_writer_pretty(writer, &json)?;
            Ok(())
        })
    }

    fn get_modified_time(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(get_modified_time(&self.path))
    }
}

//! An empty marker file standing in for a stored `null`.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::bail;
use chrono::{DateTime, Utc};

use super::file::{get_modified_time, staged_write};
use crate::store::ValueStore;
use crate::value::Value;

/// Stores `null` as an empty file. Useful for integrating side effects:
/// the file's modified time records when the side-effecting call last ran.
#[derive(Debug, Clone)]
pub struct TouchFileStore {
    path: PathBuf,
}

impl TouchFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ValueStore for TouchFileStore {
    fn read(&self) -> anyhow::Result<Value> {
        let mut file = fs::File::open(&self.path)?;
        let mut buffer = [0u8; 1];
        if file.read(&mut buffer)? > 0 {
            bail!("the path {} exists but is not empty", self.path.display());
        }
        Ok(Value::Null)
    }

    fn write(&self, value: &Value) -> anyhow::Result<()> {
        if !value.is_null() {
            bail!("a TouchFileStore can only store null");
        }
        staged_write(&self.path, |_| Ok(()))
    }

    fn get_modified_time(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(get_modified_time(&self.path))
    }
}

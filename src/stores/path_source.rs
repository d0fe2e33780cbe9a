//! A read-only source whose value is a path.

use std::path::PathBuf;

use anyhow::bail;
use chrono::{DateTime, Utc};

use super::file::get_modified_time;
use crate::store::ValueStore;
use crate::value::Value;

/// Returns the path itself from `read` rather than reading any data.
///
/// Useful for feeding file paths into calls that do their own I/O while
/// still participating in staleness analysis via the file's modified time.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
    required: bool,
}

impl PathSource {
    /// A source whose path must exist; `get_modified_time` fails when the
    /// path is missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    /// A source whose path may be absent; `get_modified_time` returns
    /// `None` for a missing path, and `read` fails instead.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }

    fn modified_time(&self, required: bool) -> anyhow::Result<Option<DateTime<Utc>>> {
        let modified = get_modified_time(&self.path);
        if modified.is_none() && required {
            bail!(
                "failed to get modified time of required source path {}",
                self.path.display()
            );
        }
        Ok(modified)
    }
}

impl ValueStore for PathSource {
    fn read(&self) -> anyhow::Result<Value> {
        if !self.required {
            self.modified_time(true)?;
        }
        Ok(Value::Path(self.path.clone()))
    }

    fn write(&self, _value: &Value) -> anyhow::Result<()> {
        bail!("a PathSource cannot be written")
    }

    fn get_modified_time(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.modified_time(self.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_sources_fail_on_missing_paths() {
        let source = PathSource::new("/does/not/exist");
        assert!(source.get_modified_time().is_err());
    }

    #[test]
    fn optional_sources_report_missing_paths_as_none() {
        let source = PathSource::optional("/does/not/exist");
        assert_eq!(source.get_modified_time().expect("mtime"), None);
        assert!(source.read().is_err());
    }

    #[test]
    fn read_returns_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "data").expect("write file");
        let source = PathSource::new(&path);
        assert_eq!(source.read().expect("read"), Value::Path(path));
        assert!(source.get_modified_time().expect("mtime").is_some());
    }
}

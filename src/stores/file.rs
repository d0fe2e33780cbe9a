//! Shared helpers for file-backed stores.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

const STAGING_SUFFIX: &str = ".STAGING";

/// The modified time of `path`, or `None` if it does not exist or is
/// inaccessible.
pub fn get_modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

/// Write a file atomically: the content is written to a staging path which
/// is renamed over `path` on success and removed on failure.
pub fn staged_write(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<fs::File>) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let staged = staging_path(path);
    let result = (|| {
        let file = fs::File::create(&staged)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            fs::rename(&staged, path)?;
            Ok(())
        }
        Err(error) => {
            let _ = fs::remove_file(&staged);
            Err(error)
        }
    }
}

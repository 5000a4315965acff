//! Atomic file replacement.
//!
//! Writes follow this pattern:
//! 1. Write content to a temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Rename it over the target
//!
//! Source and destination must be on the same filesystem for the rename to be
//! atomic, which holds because the temporary file is a sibling of the target.
//! After a crash a stray `.{filename}.{suffix}.tmp` may remain; it is never read.

use crate::error::{QueueError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomically write bytes to a file, creating parent directories as needed.
///
/// # Returns
///
/// * `Ok(())` - On successful atomic write
/// * `Err(QueueError::StoreError)` - On write or rename failure
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            QueueError::StoreError(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        QueueError::StoreError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    // Persist the directory entry too
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        })
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Sibling temp path with a random suffix, so concurrent writers never share one.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            QueueError::StoreError(format!("invalid file path '{}'", target.display()))
        })?;

    let temp_name = format!(".{}.{}.tmp", filename, Uuid::new_v4().simple());
    Ok(match target.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    })
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        QueueError::StoreError(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(path);
            QueueError::StoreError(format!(
                "failed to write temporary file '{}': {}",
                path.display(),
                e
            ))
        })
}

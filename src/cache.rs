//! On-disk inventory snapshots.
//!
//! Each source owns one directory under the configured cache root and
//! writes its last successful backend response there as JSON. Writes go
//! to a temporary file in the same directory and are then renamed over
//! the previous snapshot, so a reader sees either the old cache or the
//! new one, never a half-written file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::InventoryError;

/// Replace the snapshot at `path` with `value`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("cache path has no parent directory: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace cache file: {}", path.display()))?;

    tracing::debug!(path = %path.display(), "cache written");
    Ok(())
}

/// Read a user- or source-owned text file, mapping I/O failures to
/// [`InventoryError`] tagged with the source `label`.
pub fn read_text(label: &str, path: &Path) -> Result<String, InventoryError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InventoryError::CacheMissing {
                label: label.to_string(),
                path: path.to_path_buf(),
            }
        } else {
            InventoryError::CacheUnreadable {
                label: label.to_string(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}

/// Read and decode the snapshot at `path`.
///
/// A missing file and an undecodable file are reported as distinct
/// [`InventoryError`] variants tagged with the source `label`.
pub fn read_json<T: DeserializeOwned>(label: &str, path: &Path) -> Result<T, InventoryError> {
    let content = read_text(label, path)?;
    serde_json::from_str(&content).map_err(|e| InventoryError::CacheUnreadable {
        label: label.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Decode each raw record on its own, skipping (and logging) the ones
/// that do not fit `T`.
pub fn decode_records<T: DeserializeOwned>(label: &str, kind: &str, raw: Vec<serde_json::Value>) -> Vec<T> {
    let mut out = Vec::with_capacity(raw.len());
    for (i, value) in raw.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => out.push(record),
            Err(e) => tracing::warn!(source = %label, kind, index = i, error = %e, "skipping malformed record"),
        }
    }
    out
}

/// Last modification time of a cache file, if it exists.
pub fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

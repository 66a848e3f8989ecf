//! Inventory faults a caller must be able to tell apart from "no matches".
//!
//! Most errors in hostbridge travel as [`anyhow::Error`]. The cache faults
//! below are raised as typed values so callers can
//! [`downcast_ref`](anyhow::Error::downcast_ref) them out of the chain.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    /// No cache file yet: the source has never been updated.
    #[error("inventory cache for {label} not found at {} (run `hostbridge update`)", path.display())]
    CacheMissing { label: String, path: PathBuf },

    /// The cache file exists but could not be read or decoded.
    #[error("inventory cache for {label} at {} is unreadable: {reason}", path.display())]
    CacheUnreadable {
        label: String,
        path: PathBuf,
        reason: String,
    },
}

impl InventoryError {
    /// Label of the source whose cache failed.
    pub fn label(&self) -> &str {
        match self {
            Self::CacheMissing { label, .. } | Self::CacheUnreadable { label, .. } => label,
        }
    }
}

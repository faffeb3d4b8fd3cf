//! Local persistent storage for the photo gallery
//!
//! The gallery persists everything through a small synchronous key-value
//! store, the same shape as browser local storage. Two
//! backends are provided: an in-memory map and a JSON file on disk.

mod file;
mod library;
mod memory;

pub use file::FileStore;
pub use library::{PhotoLibrary, BACKUP_KEY_PREFIX, DEFAULT_MAX_BACKUPS};
pub use memory::MemoryStore;

use crate::error::Result;

/// Current photo list, JSON array
pub const PHOTOS_KEY: &str = "photoStorage";
/// Persisted access token
pub const TOKEN_KEY: &str = "github_token";
/// ISO-8601 timestamp of the last successful push or pull
pub const LAST_SYNC_KEY: &str = "lastCloudSync";
/// Mirror of what was last written to or read from the cloud record
pub const CLOUD_MIRROR_KEY: &str = "cloud_photos";

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value; fails with `StorageQuota` when the store is full
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently present, in no particular order
    fn keys(&self) -> Result<Vec<String>>;
}

/// Check a prospective write against an optional byte quota.
///
/// Usage is counted as the sum of key and value lengths.
pub(crate) fn check_quota<'a>(
    quota: Option<usize>,
    entries: impl Iterator<Item = (&'a String, &'a String)>,
    key: &str,
    value: &str,
) -> Result<()> {
    let Some(limit) = quota else {
        return Ok(());
    };
    let others: usize = entries
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
    let needed = others + key.len() + value.len();
    if needed > limit {
        return Err(crate::error::GalleryError::StorageQuota(format!(
            "writing '{}' needs {} bytes, quota is {} bytes",
            key, needed, limit
        )));
    }
    Ok(())
}

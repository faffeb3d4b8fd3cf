//! Photo library persisted in a key-value store

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::{KeyValueStore, CLOUD_MIRROR_KEY, LAST_SYNC_KEY, PHOTOS_KEY};
use crate::error::{GalleryError, Result};
use crate::types::{normalize_photo, Photo, PhotoLite, StorageUsage};

/// Prefix of pre-pull snapshot keys (`backup_<millis>`)
pub const BACKUP_KEY_PREFIX: &str = "backup_";

/// Snapshots kept unless configured otherwise
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Typed view over the gallery's persisted keys
#[derive(Clone)]
pub struct PhotoLibrary {
    store: Arc<dyn KeyValueStore>,
    max_backups: usize,
}

impl PhotoLibrary {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    /// Keep at most `max_backups` snapshots (at least one)
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Load the local photo set.
    ///
    /// A missing or corrupt list reads as empty; malformed entries are dropped.
    pub fn load(&self) -> Result<Vec<Photo>> {
        let Some(raw) = self.store.get(PHOTOS_KEY)? else {
            return Ok(Vec::new());
        };
        Ok(parse_photo_list(&raw))
    }

    pub fn save(&self, photos: &[Photo]) -> Result<()> {
        let json = serde_json::to_string(photos)?;
        self.store.set(PHOTOS_KEY, &json)
    }

    /// Insert a photo at the front (newest first), replacing any existing
    /// photo with the same id
    pub fn add(&self, photo: Photo) -> Result<()> {
        let mut photos = self.load()?;
        photos.retain(|p| p.id != photo.id);
        photos.insert(0, photo);
        self.save(&photos)
    }

    /// Remove a photo by id, returning it if it was present
    pub fn remove(&self, id: &str) -> Result<Option<Photo>> {
        let mut photos = self.load()?;
        let Some(index) = photos.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        let removed = photos.remove(index);
        self.save(&photos)?;
        Ok(Some(removed))
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }

    /// Snapshot the current local set under a fresh `backup_<millis>` key,
    /// then prune snapshots beyond the retention limit.
    ///
    /// Returns `None` without writing anything when the local set is empty.
    pub fn backup(&self) -> Result<Option<String>> {
        let Some(raw) = self.store.get(PHOTOS_KEY)? else {
            return Ok(None);
        };
        if parse_photo_list(&raw).is_empty() {
            return Ok(None);
        }

        let millis = Utc::now().timestamp_millis();
        let mut key = format!("{}{}", BACKUP_KEY_PREFIX, millis);
        let mut bump = 1;
        while self.store.get(&key)?.is_some() {
            key = format!("{}{}", BACKUP_KEY_PREFIX, millis + bump);
            bump += 1;
        }

        self.store.set(&key, &raw)?;
        tracing::info!("Backed up local photos to {}", key);
        if let Err(e) = self.prune_backups() {
            tracing::warn!("Could not prune old backups: {}", e);
        }
        Ok(Some(key))
    }

    /// Delete the oldest snapshots beyond the retention limit, returning
    /// the removed keys
    pub fn prune_backups(&self) -> Result<Vec<String>> {
        let stale: Vec<String> = self.backups()?.into_iter().skip(self.max_backups).collect();
        for key in &stale {
            self.store.remove(key)?;
            tracing::debug!("Pruned backup {}", key);
        }
        Ok(stale)
    }

    /// Backup keys, newest first
    pub fn backups(&self) -> Result<Vec<String>> {
        let mut keys: Vec<(i64, String)> = self
            .store
            .keys()?
            .into_iter()
            .filter_map(|k| {
                let millis = k.strip_prefix(BACKUP_KEY_PREFIX)?.parse::<i64>().ok()?;
                Some((millis, k))
            })
            .collect();
        keys.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(keys.into_iter().map(|(_, k)| k).collect())
    }

    /// Replace the local set with a backup's contents
    pub fn restore_backup(&self, key: &str) -> Result<Vec<Photo>> {
        if !key.starts_with(BACKUP_KEY_PREFIX) {
            return Err(GalleryError::Storage(format!("{} is not a backup key", key)));
        }
        let raw = self
            .store
            .get(key)?
            .ok_or_else(|| GalleryError::Storage(format!("Backup {} not found", key)))?;
        let photos = parse_photo_list(&raw);
        self.save(&photos)?;
        Ok(photos)
    }

    /// Remember what the cloud record now holds
    pub fn set_cloud_mirror(&self, photos: &[PhotoLite]) -> Result<()> {
        let json = serde_json::to_string(photos)?;
        self.store.set(CLOUD_MIRROR_KEY, &json)
    }

    pub fn record_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.store
            .set(LAST_SYNC_KEY, &at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get(LAST_SYNC_KEY)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Bytes held locally and in the cloud mirror
    pub fn usage(&self) -> Result<StorageUsage> {
        let local_bytes = self.load()?.iter().map(|p| p.compressed_size).sum();
        let cloud_bytes = self
            .store
            .get(CLOUD_MIRROR_KEY)?
            .and_then(|raw| serde_json::from_str::<Vec<Value>>(&raw).ok())
            .unwrap_or_default()
            .iter()
            .map(|entry| {
                entry
                    .get("compressedSize")
                    .or_else(|| entry.get("size"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
            })
            .sum();
        Ok(StorageUsage {
            local_bytes,
            cloud_bytes,
        })
    }

    /// Pretty-printed JSON export of the local set
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.load()?)?)
    }
}

fn parse_photo_list(raw: &str) -> Vec<Photo> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.iter().filter_map(normalize_photo).collect(),
        Ok(_) => {
            tracing::warn!("Stored photo list is not an array, treating as empty");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Stored photo list is corrupt, treating as empty: {}", e);
            Vec::new()
        }
    }
}

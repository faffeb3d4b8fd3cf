//! Cloud sync manager
//!
//! Owns the session and drives every remote interaction:
//! - `connect` / `restore_session` validate a token and ensure the container
//! - `push` serializes the local set into the reserved record
//! - `pull` restores the local set from that record, backing up first
//! - `delete_remote` removes one photo from the record
//!
//! The remote record is always re-located by title before it is mutated.
//! Nothing here is atomic across requests: overlapping writers race and the
//! last write wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::listener::{Severity, SyncListener};
use super::remote::{Record, RemoteClient};
use super::session::{validate_token_format, Session};
use super::transport::Transport;
use super::{SyncDirection, SyncEvent};
use crate::error::{ErrorKind, GalleryError, Result};
use crate::storage::{KeyValueStore, PhotoLibrary, TOKEN_KEY};
use crate::types::{Envelope, Photo, PhotoLite, SyncConfig, SyncStatus};

/// Result of a successful identity check
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub owner: String,
    /// False when the identity is valid but the container could not be ensured
    pub storage_ready: bool,
    pub storage_error: Option<String>,
}

/// Result of writing the local set to the remote record
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub record_number: u64,
    pub photo_count: usize,
    pub envelope_bytes: usize,
    /// True when a new record was created instead of replacing one
    pub created: bool,
}

/// Result of restoring the local set from the remote record
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    pub photos: Vec<Photo>,
    /// `None` when the cloud holds no record yet
    pub record_number: Option<u64>,
    pub envelope_bytes: usize,
    pub backup_key: Option<String>,
    /// False when the pulled photos could not be written to local storage
    pub persisted: bool,
    pub warning: Option<String>,
}

/// The single sync engine between the local library and the remote store
pub struct CloudSyncManager {
    remote: RemoteClient,
    library: PhotoLibrary,
    listener: Arc<dyn SyncListener>,
    session: Mutex<Session>,
    last_event: Mutex<Option<SyncEvent>>,
}

impl CloudSyncManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        listener: Arc<dyn SyncListener>,
        config: SyncConfig,
    ) -> Self {
        Self {
            library: PhotoLibrary::new(store).with_max_backups(config.max_backups),
            remote: RemoteClient::new(transport, config),
            listener,
            session: Mutex::new(Session::new()),
            last_event: Mutex::new(None),
        }
    }

    pub fn library(&self) -> &PhotoLibrary {
        &self.library
    }

    pub fn config(&self) -> &SyncConfig {
        self.remote.config()
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    pub fn status(&self) -> SyncStatus {
        let session = self.session.lock().clone();
        SyncStatus {
            connected: session.is_connected(),
            storage_ready: session.storage_ready(),
            owner: session.owner().map(String::from),
            last_sync: self.library.last_sync().ok().flatten(),
            last_error: session.last_error().map(String::from),
        }
    }

    pub fn last_event(&self) -> Option<SyncEvent> {
        self.last_event.lock().clone()
    }

    /// Validate `candidate` against the identity endpoint and open a session.
    ///
    /// Malformed tokens fail with `Format` before any request is made. A
    /// failure to ensure the container, including an auth or network error,
    /// does not fail or drop the connection; it is reported through
    /// [`ConnectOutcome::storage_ready`].
    pub async fn connect(&self, candidate: &str) -> Result<ConnectOutcome> {
        if let Err(e) = validate_token_format(candidate) {
            self.fail_session(&e);
            return Err(e);
        }
        let token = candidate.trim();

        let identity = match self.remote.get_identity(token).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!("Identity check failed: {}", e);
                self.fail_session(&e);
                return Err(e);
            }
        };

        self.session.lock().establish(token, &identity.login);
        if let Err(e) = self.library.store().set(TOKEN_KEY, token) {
            tracing::warn!("Could not persist token: {}", e);
        }
        tracing::info!("Authenticated as {}", identity.login);

        let (storage_ready, storage_error) = match self.check_storage().await {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::warn!("Cloud storage unavailable: {}", e);
                (false, Some(e.to_string()))
            }
        };

        let message = match &storage_error {
            None => format!("Connected as {}", identity.login),
            Some(err) => format!(
                "Connected as {}, but cloud storage is unavailable: {}",
                identity.login, err
            ),
        };
        self.listener.on_status_change(true, &message);

        Ok(ConnectOutcome {
            owner: identity.login,
            storage_ready,
            storage_error,
        })
    }

    /// Reconnect with the persisted token, if any.
    ///
    /// A token rejected by the remote (or no longer well-formed) is removed.
    pub async fn restore_session(&self) -> Result<Option<ConnectOutcome>> {
        let Some(token) = self.library.store().get(TOKEN_KEY)? else {
            return Ok(None);
        };
        match self.connect(&token).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                if matches!(e.kind(), ErrorKind::Auth | ErrorKind::Format) {
                    tracing::info!("Discarding stored token: {}", e);
                    self.library.store().remove(TOKEN_KEY)?;
                }
                Err(e)
            }
        }
    }

    /// Forget the session and the persisted token
    pub fn disconnect(&self) -> Result<()> {
        self.session.lock().clear();
        self.library.store().remove(TOKEN_KEY)?;
        self.listener.on_status_change(false, "Disconnected from cloud storage");
        Ok(())
    }

    /// Make sure the remote container exists, creating it on first use.
    ///
    /// Idempotent: an existing container is left untouched.
    pub async fn ensure_container(&self) -> Result<()> {
        let result = self.check_storage().await;
        self.track(result)
    }

    /// Ensure the container and record storage readiness, leaving the
    /// identity state alone
    async fn check_storage(&self) -> Result<()> {
        let (token, owner) = self.credentials()?;
        let result = self.ensure_container_with(&token, &owner).await;
        {
            let mut session = self.session.lock();
            match &result {
                Ok(()) => session.set_storage_ready(true, None),
                Err(e) => session.set_storage_ready(false, Some(e.to_string())),
            }
        }
        result
    }

    async fn ensure_container_with(&self, token: &str, owner: &str) -> Result<()> {
        let config = self.remote.config();
        match self.remote.get_container(token, owner).await {
            Ok(_) => {
                tracing::debug!("Container {}/{} exists", owner, config.container_name);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::info!("Creating container {}/{}", owner, config.container_name);
        self.remote.create_container(token).await?;

        if let Err(e) = self
            .remote
            .put_file(
                token,
                owner,
                &config.placeholder_path,
                "Initialize photo storage",
                &placeholder_document(config),
            )
            .await
        {
            tracing::warn!("Could not write placeholder document: {}", e);
        }
        Ok(())
    }

    /// Write `photos` into the reserved record, creating it if needed
    pub async fn push(&self, photos: &[Photo]) -> Result<PushOutcome> {
        if photos.is_empty() {
            let e = GalleryError::EmptyInput("there are no local photos to upload".to_string());
            self.listener.on_notify(&e.to_string(), Severity::Warning);
            return Err(e);
        }

        let started_at = Utc::now();
        let result = self.write_photos(photos).await;
        let bytes = result.as_ref().map(|o| o.envelope_bytes).unwrap_or(0);
        self.record_event(SyncDirection::Push, started_at, bytes, &result);

        match &result {
            Ok(outcome) => self.listener.on_notify(
                &format!("Uploaded {} photos to the cloud", outcome.photo_count),
                Severity::Success,
            ),
            Err(e) => self.listener.on_notify(&format!("Upload failed: {}", e), Severity::Error),
        }
        self.track(result)
    }

    /// Push the current local library
    pub async fn push_local(&self) -> Result<PushOutcome> {
        let photos = self.library.load()?;
        self.push(&photos).await
    }

    async fn write_photos(&self, photos: &[Photo]) -> Result<PushOutcome> {
        let (token, owner) = self.credentials()?;
        let config = self.remote.config();

        let lites: Vec<PhotoLite> = photos
            .iter()
            .filter_map(|p| PhotoLite::from_photo(p, config.max_payload_chars))
            .collect();
        let envelope = Envelope::new(lites);
        let (body, size) = envelope.to_body()?;
        if size > config.max_envelope_bytes {
            return Err(GalleryError::PayloadTooLarge {
                size,
                limit: config.max_envelope_bytes,
            });
        }

        self.ensure_storage().await?;

        let title = config.record_title.as_str();
        let (record, created) = match self.remote.find_record(&token, &owner, title).await? {
            Some(existing) => {
                match self
                    .remote
                    .update_record(&token, &owner, existing.number, title, &body)
                    .await
                {
                    Ok(record) => (record, false),
                    Err(e) => {
                        tracing::warn!(
                            "Replacing record #{} failed ({}), creating a new one",
                            existing.number,
                            e
                        );
                        (self.create_record(&token, &owner, &body).await?, true)
                    }
                }
            }
            None => (self.create_record(&token, &owner, &body).await?, true),
        };

        tracing::info!(
            "Wrote {} photos ({} bytes) to record #{}",
            envelope.count,
            size,
            record.number
        );
        self.remember_cloud_state(&envelope.photos);

        Ok(PushOutcome {
            record_number: record.number,
            photo_count: envelope.count,
            envelope_bytes: size,
            created,
        })
    }

    /// Create the reserved record and tag it; tagging is best-effort
    async fn create_record(&self, token: &str, owner: &str, body: &str) -> Result<Record> {
        let config = self.remote.config();
        let record = self
            .remote
            .create_record(token, owner, &config.record_title, body)
            .await?;
        if let Err(e) = self
            .remote
            .add_label(token, owner, record.number, &config.record_label)
            .await
        {
            tracing::warn!("Could not label record #{}: {}", record.number, e);
        }
        Ok(record)
    }

    /// Restore the local set from the reserved record.
    ///
    /// No record, or a corrupt record body, yields an empty outcome without
    /// touching local storage. Otherwise the current local set is backed up
    /// and replaced. The local set is never overwritten without a backup: a
    /// failed backup or a failed local write is reported as a warning and
    /// the pulled photos are still returned and announced, unpersisted.
    pub async fn pull(&self) -> Result<PullOutcome> {
        let started_at = Utc::now();
        let result = self.pull_inner().await;
        let bytes = result.as_ref().map(|o| o.envelope_bytes).unwrap_or(0);
        self.record_event(SyncDirection::Pull, started_at, bytes, &result);

        if let Err(e) = &result {
            self.listener.on_notify(&format!("Download failed: {}", e), Severity::Error);
        }
        self.track(result)
    }

    async fn pull_inner(&self) -> Result<PullOutcome> {
        let Some((record, parsed)) = self.fetch_remote().await? else {
            self.listener
                .on_notify("No photos in the cloud yet", Severity::Info);
            return Ok(PullOutcome::default());
        };
        let envelope_bytes = record.body.as_deref().map(str::len).unwrap_or(0);

        let photos = match parsed {
            Ok(photos) => photos,
            Err(e) => {
                let warning = format!("Cloud data could not be read: {}", e);
                tracing::warn!("Record #{}: {}", record.number, warning);
                self.listener.on_notify(&warning, Severity::Warning);
                return Ok(PullOutcome {
                    record_number: Some(record.number),
                    envelope_bytes,
                    warning: Some(warning),
                    ..PullOutcome::default()
                });
            }
        };

        let (backup_key, persisted, warning) = match self.library.backup() {
            Err(e) => {
                let warning = format!(
                    "Downloaded {} photos but kept the local library, backing it up failed: {}",
                    photos.len(),
                    e
                );
                (None, false, Some(warning))
            }
            Ok(key) => match self.library.save(&photos) {
                Ok(()) => (key, true, None),
                Err(e) => {
                    let warning = format!(
                        "Downloaded {} photos but could not save them locally: {}",
                        photos.len(),
                        e
                    );
                    (key, false, Some(warning))
                }
            },
        };
        if let Some(warning) = &warning {
            tracing::warn!("{}", warning);
            self.listener.on_notify(warning, Severity::Warning);
        }

        let mirror: Vec<PhotoLite> = photos
            .iter()
            .filter_map(|p| PhotoLite::from_photo(p, None))
            .collect();
        self.remember_cloud_state(&mirror);

        self.listener.on_photos_replaced(&photos);
        if persisted {
            self.listener.on_notify(
                &format!("Downloaded {} photos from the cloud", photos.len()),
                Severity::Success,
            );
        }

        Ok(PullOutcome {
            photos,
            record_number: Some(record.number),
            envelope_bytes,
            backup_key,
            persisted,
            warning,
        })
    }

    /// Locate and parse the reserved record without touching local storage.
    ///
    /// The inner result carries a body parse failure separately so callers
    /// can downgrade it.
    async fn fetch_remote(&self) -> Result<Option<(Record, Result<Vec<Photo>>)>> {
        let (token, owner) = self.credentials()?;
        self.ensure_storage().await?;

        let title = self.remote.config().record_title.as_str();
        let Some(record) = self.remote.find_record(&token, &owner, title).await? else {
            return Ok(None);
        };
        let parsed = Envelope::parse(record.body.as_deref().unwrap_or_default())
            .map(|envelope| envelope.photos);
        Ok(Some((record, parsed)))
    }

    /// Remove one photo from the remote record.
    ///
    /// Read-modify-write: returns `None` without writing when there is no
    /// record or the photo is not in it. An unreadable record fails with
    /// `Parse` and is left untouched.
    pub async fn delete_remote(&self, photo_id: &str) -> Result<Option<PushOutcome>> {
        let result = self.delete_remote_inner(photo_id).await;
        match &result {
            Ok(Some(_)) => self
                .listener
                .on_notify("Photo removed from the cloud", Severity::Success),
            Ok(None) => {}
            Err(e) => self
                .listener
                .on_notify(&format!("Cloud delete failed: {}", e), Severity::Error),
        }
        self.track(result)
    }

    async fn delete_remote_inner(&self, photo_id: &str) -> Result<Option<PushOutcome>> {
        let Some((record, parsed)) = self.fetch_remote().await? else {
            tracing::debug!("No cloud record, nothing to delete");
            return Ok(None);
        };
        let mut photos = parsed.map_err(|e| {
            GalleryError::Parse(format!("cloud record #{} is unreadable: {}", record.number, e))
        })?;

        let before = photos.len();
        photos.retain(|p| p.id != photo_id);
        if photos.len() == before {
            tracing::debug!("Photo {} is not in the cloud", photo_id);
            return Ok(None);
        }

        self.write_photos(&photos).await.map(Some)
    }

    fn credentials(&self) -> Result<(String, String)> {
        self.session
            .lock()
            .credentials()
            .ok_or(GalleryError::NotConnected)
    }

    async fn ensure_storage(&self) -> Result<()> {
        if self.session.lock().storage_ready() {
            return Ok(());
        }
        self.ensure_container().await
    }

    fn remember_cloud_state(&self, photos: &[PhotoLite]) {
        if let Err(e) = self.library.set_cloud_mirror(photos) {
            tracing::warn!("Could not cache cloud mirror: {}", e);
        }
        if let Err(e) = self.library.record_sync_time(Utc::now()) {
            tracing::warn!("Could not record sync time: {}", e);
        }
    }

    /// Mark the session failed and tell the presentation layer
    fn fail_session(&self, error: &GalleryError) {
        let message = error.to_string();
        self.session.lock().invalidate(message.clone());
        self.listener.on_status_change(false, &message);
    }

    /// Downgrade the session when a failure means the credentials are unusable
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.invalidates_session() && self.is_connected() {
                tracing::warn!("Session invalidated: {}", e);
                self.fail_session(e);
            }
        }
        result
    }

    fn record_event<T>(
        &self,
        direction: SyncDirection,
        started_at: DateTime<Utc>,
        bytes: usize,
        result: &Result<T>,
    ) {
        let completed_at = Utc::now();
        match result {
            Ok(_) => tracing::info!(
                "Sync {:?} completed: {} bytes in {:?}",
                direction,
                bytes,
                completed_at - started_at
            ),
            Err(e) => tracing::error!("Sync {:?} failed: {}", direction, e),
        }
        *self.last_event.lock() = Some(SyncEvent {
            direction,
            started_at,
            completed_at: Some(completed_at),
            bytes_transferred: bytes as u64,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }
}

fn placeholder_document(config: &SyncConfig) -> String {
    format!(
        "# Photo storage\n\n\
         This repository is managed by gallery-sync.\n\n\
         Photo metadata lives in the issue titled \"{}\". \
         Editing that issue by hand may corrupt the gallery.\n",
        config.record_title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::sync::listener::NoopListener;
    use crate::sync::transport::{ApiRequest, RawResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that counts calls and always answers 500
    #[derive(Default)]
    struct Unreachable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Unreachable {
        async fn execute(&self, _request: &ApiRequest) -> Result<RawResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse {
                status: 500,
                body: String::new(),
            })
        }
    }

    fn manager(transport: Arc<Unreachable>) -> CloudSyncManager {
        CloudSyncManager::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(NoopListener),
            SyncConfig::default(),
        )
    }

    fn photo() -> Photo {
        crate::types::normalize_photo(&serde_json::json!({"id": "1", "data": "abc"})).unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let transport = Arc::new(Unreachable::default());
        let manager = manager(transport.clone());

        let err = manager.push(&[photo()]).await.unwrap_err();
        assert!(matches!(err, GalleryError::NotConnected));
        let err = manager.pull().await.unwrap_err();
        assert!(matches!(err, GalleryError::NotConnected));
        let err = manager.delete_remote("1").await.unwrap_err();
        assert!(matches!(err, GalleryError::NotConnected));
        let err = manager.ensure_container().await.unwrap_err();
        assert!(matches!(err, GalleryError::NotConnected));

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        let event = manager.last_event().unwrap();
        assert_eq!(event.direction, SyncDirection::Pull);
        assert!(!event.success);
    }

    #[tokio::test]
    async fn test_server_error_on_identity_leaves_disconnected() {
        let transport = Arc::new(Unreachable::default());
        let manager = manager(transport.clone());

        let err = manager.connect("ghp_abcdefghijklmnop").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(!manager.is_connected());
        assert!(manager.status().last_error.is_some());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_without_token_is_noop() {
        let transport = Arc::new(Unreachable::default());
        let manager = manager(transport.clone());
        assert!(manager.restore_session().await.unwrap().is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}

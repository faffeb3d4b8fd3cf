//! Notification interface towards the presentation layer

use crate::types::Photo;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Callbacks the sync engine invokes; injected at construction
pub trait SyncListener: Send + Sync {
    /// Connection state changed
    fn on_status_change(&self, connected: bool, message: &str);

    /// The in-memory photo list was replaced by pulled data
    fn on_photos_replaced(&self, photos: &[Photo]);

    /// Transient notification
    fn on_notify(&self, message: &str, severity: Severity);
}

/// Listener that ignores everything
pub struct NoopListener;

impl SyncListener for NoopListener {
    fn on_status_change(&self, _connected: bool, _message: &str) {}

    fn on_photos_replaced(&self, _photos: &[Photo]) {}

    fn on_notify(&self, _message: &str, _severity: Severity) {}
}

/// Listener that writes every callback to the log
pub struct TracingListener;

impl SyncListener for TracingListener {
    fn on_status_change(&self, connected: bool, message: &str) {
        if connected {
            tracing::info!("Cloud connected: {}", message);
        } else {
            tracing::warn!("Cloud disconnected: {}", message);
        }
    }

    fn on_photos_replaced(&self, photos: &[Photo]) {
        tracing::info!("Photo list replaced ({} photos)", photos.len());
    }

    fn on_notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}

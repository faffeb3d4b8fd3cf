//! Cloud sync of the photo library
//!
//! Mirrors the local photo set into a single record ("issue") of a remote
//! container ("repository") on a GitHub-style issue tracker.
//!
//! # Feature Flags
//!
//! The reqwest-backed [`HttpTransport`] requires the `github` feature.
//! Everything else works against any [`Transport`] implementation.

mod listener;
mod manager;
mod remote;
mod session;
mod transport;

pub use listener::{NoopListener, Severity, SyncListener, TracingListener};
pub use manager::{CloudSyncManager, ConnectOutcome, PullOutcome, PushOutcome};
pub use remote::{Container, Identity, Record, RemoteClient};
pub use session::{validate_token_format, Session};
#[cfg(feature = "github")]
pub use transport::HttpTransport;
pub use transport::{ApiRequest, Method, RawResponse, Transport};

use chrono::{DateTime, Utc};

/// Sync direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Push,
    Pull,
}

/// Sync event for logging/notifications
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub direction: SyncDirection,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub bytes_transferred: u64,
    pub success: bool,
    pub error: Option<String>,
}

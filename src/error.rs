//! Error types for gallery sync

use thiserror::Error;

/// Result type alias for gallery sync operations
pub type Result<T> = std::result::Result<T, GalleryError>;

/// Main error type for gallery sync
#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Invalid credential format: {0}")]
    Format(String),

    #[error("Nothing to sync: {0}")]
    EmptyInput(String),

    /// Rejected image file (type not allowed or too large)
    #[error("Invalid image file: {0}")]
    InvalidFile(String),

    #[error("Not connected to cloud storage")]
    NotConnected,

    /// Non-success HTTP status from the remote document store
    #[error("{message} (HTTP {status})")]
    Http {
        status: u16,
        message: String,
        body: String,
    },

    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Local storage quota exceeded: {0}")]
    StorageQuota(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure classes reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    EmptyInput,
    Auth,
    NotFound,
    PayloadTooLarge,
    Validation,
    Api,
    Connectivity,
    StorageQuota,
    Parse,
    Local,
}

impl GalleryError {
    /// Build a classified error from a failed HTTP exchange.
    ///
    /// The remote `message` field is preferred over the raw body when the
    /// body is JSON; the raw body is always kept for diagnostics.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let remote_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

        let message = match (friendly_status_message(status), remote_message) {
            (Some(friendly), Some(remote)) => format!("{}: {}", friendly, remote),
            (Some(friendly), None) => friendly.to_string(),
            (None, Some(remote)) => remote,
            (None, None) => format!("Request failed with status {}", status),
        };

        GalleryError::Http {
            status,
            message,
            body,
        }
    }

    /// Classify into the reporting taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            GalleryError::Format(_) => ErrorKind::Format,
            GalleryError::EmptyInput(_) => ErrorKind::EmptyInput,
            GalleryError::InvalidFile(_) => ErrorKind::Validation,
            GalleryError::NotConnected => ErrorKind::Auth,
            GalleryError::Http { status, .. } => match status {
                401 | 403 => ErrorKind::Auth,
                404 => ErrorKind::NotFound,
                413 => ErrorKind::PayloadTooLarge,
                422 => ErrorKind::Validation,
                _ => ErrorKind::Api,
            },
            GalleryError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            GalleryError::Connectivity(_) => ErrorKind::Connectivity,
            GalleryError::StorageQuota(_) => ErrorKind::StorageQuota,
            GalleryError::Parse(_) | GalleryError::Serialization(_) => ErrorKind::Parse,
            GalleryError::Storage(_)
            | GalleryError::Io(_)
            | GalleryError::Config(_)
            | GalleryError::Internal(_) => ErrorKind::Local,
        }
    }

    /// HTTP status carried by the error, if it came from the remote store
    pub fn status(&self) -> Option<u16> {
        match self {
            GalleryError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Whether this failure means the stored session can no longer be trusted
    pub fn invalidates_session(&self) -> bool {
        matches!(self.kind(), ErrorKind::Auth | ErrorKind::Connectivity)
    }
}

/// Human-readable explanation for the statuses users actually hit
fn friendly_status_message(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("Token is invalid or expired"),
        403 => Some("Token lacks the required scope or the rate limit was exceeded"),
        404 => Some("Resource not found"),
        413 => Some("Request payload too large for the remote store"),
        422 => Some("Remote store rejected the request"),
        _ => None,
    }
}

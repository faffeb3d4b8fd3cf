//! Credential and session state

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GalleryError, Result};

/// Recognized personal/app token prefixes followed by the token body
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ghp_|gho_|ghu_|ghs_|ghr_|github_pat_)[A-Za-z0-9_]{10,255}$").unwrap()
});

/// Reject empty or malformed credentials without touching the network
pub fn validate_token_format(token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(GalleryError::Format("token is empty".to_string()));
    }
    if !TOKEN_PATTERN.is_match(token) {
        return Err(GalleryError::Format(
            "token must start with ghp_, gho_, ghu_, ghs_, ghr_ or github_pat_".to_string(),
        ));
    }
    Ok(())
}

/// Connection state of the sync engine.
///
/// Identity validity and storage availability are tracked separately;
/// only [`Session::is_connected`] is reported as "connected".
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: String,
    owner: Option<String>,
    identity_verified: bool,
    storage_ready: bool,
    last_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token non-empty, owner known and validated against the identity endpoint
    pub fn is_connected(&self) -> bool {
        self.identity_verified && !self.token.is_empty() && self.owner.is_some()
    }

    /// Connected and the remote container is known to exist
    pub fn storage_ready(&self) -> bool {
        self.is_connected() && self.storage_ready
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `(token, owner)` when connected
    pub fn credentials(&self) -> Option<(String, String)> {
        if !self.is_connected() {
            return None;
        }
        Some((self.token.clone(), self.owner.clone()?))
    }

    pub(crate) fn establish(&mut self, token: &str, owner: &str) {
        self.token = token.trim().to_string();
        self.owner = Some(owner.to_string());
        self.identity_verified = true;
        self.storage_ready = false;
        self.last_error = None;
    }

    pub(crate) fn set_storage_ready(&mut self, ready: bool, error: Option<String>) {
        self.storage_ready = ready;
        self.last_error = error;
    }

    /// Drop the verified state after a failure; the token is kept for retries
    pub(crate) fn invalidate(&mut self, reason: impl Into<String>) {
        self.identity_verified = false;
        self.storage_ready = false;
        self.last_error = Some(reason.into());
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

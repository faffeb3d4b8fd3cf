//! HTTP transport seam for the remote document store

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
#[cfg(feature = "github")]
use crate::error::GalleryError;
#[cfg(feature = "github")]
use crate::types::SyncConfig;

/// Media type requested from the document store
pub const ACCEPT_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// HTTP method subset used by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }

    /// Whether a JSON body is sent with this method
    pub fn is_write(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

/// One request against the document store, relative to its base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/repos/o/r/issues?state=all`
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Status and raw text of a completed exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes requests against the document store.
///
/// Implementations return `Ok` for every response the server produced,
/// whatever its status; only failures to complete the exchange (DNS,
/// refused connection, broken stream) are errors, reported as
/// `GalleryError::Connectivity`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse>;
}

/// reqwest-backed transport
#[cfg(feature = "github")]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "github")]
impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GalleryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[cfg(feature = "github")]
#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::ACCEPT, ACCEPT_MEDIA_TYPE);
        if let Some(token) = &request.token {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if request.method.is_write() {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!("{} {} failed: {}", request.method.as_str(), url, e);
            GalleryError::Connectivity(format!(
                "Could not reach {}, check your network connection",
                self.base_url
            ))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            tracing::debug!("Reading response of {} {} failed: {}", request.method.as_str(), url, e);
            GalleryError::Connectivity("Connection dropped while reading the response".to_string())
        })?;

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method.as_str(),
            request.path,
            status,
            body.len()
        );

        Ok(RawResponse { status, body })
    }
}

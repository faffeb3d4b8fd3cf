//! Typed client for the remote document store (GitHub REST subset)

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::transport::{ApiRequest, Method, Transport};
use crate::error::{GalleryError, Result};
use crate::types::SyncConfig;

/// Authenticated identity returned by `/user`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Remote container (repository)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Remote record (issue)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Present when the "issue" is actually a pull request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
}

/// Document store client; stateless apart from configuration
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute a request and decode the JSON response.
    ///
    /// The raw text is read first so failures and non-JSON bodies can be
    /// reported with the server's own words.
    async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.transport.execute(&request).await?;

        if !response.is_success() {
            tracing::debug!(
                "{} {} failed with {}: {}",
                request.method.as_str(),
                request.path,
                response.status,
                response.body
            );
            return Err(GalleryError::from_status(response.status, response.body));
        }

        let text = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| {
            GalleryError::Parse(format!(
                "Unexpected response to {} {}: {}",
                request.method.as_str(),
                request.path,
                e
            ))
        })
    }

    fn repo_path(&self, owner: &str) -> String {
        format!("/repos/{}/{}", owner, self.config.container_name)
    }

    pub async fn get_identity(&self, token: &str) -> Result<Identity> {
        self.request(ApiRequest::get("/user").with_token(token))
            .await
    }

    pub async fn get_container(&self, token: &str, owner: &str) -> Result<Container> {
        self.request(ApiRequest::get(self.repo_path(owner)).with_token(token))
            .await
    }

    /// Create the public, auto-initialized container
    pub async fn create_container(&self, token: &str) -> Result<Container> {
        let body = json!({
            "name": self.config.container_name,
            "description": self.config.container_description,
            "private": false,
            "auto_init": true,
        });
        self.request(
            ApiRequest::new(Method::Post, "/user/repos")
                .with_body(body)
                .with_token(token),
        )
        .await
    }

    /// Create or overwrite a file in the container
    pub async fn put_file(
        &self,
        token: &str,
        owner: &str,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<()> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
        });
        let _: Value = self
            .request(
                ApiRequest::new(
                    Method::Put,
                    format!("{}/contents/{}", self.repo_path(owner), path),
                )
                .with_body(body)
                .with_token(token),
            )
            .await?;
        Ok(())
    }

    /// One page of records in any state, 1-based
    pub async fn list_records(&self, token: &str, owner: &str, page: u32) -> Result<Vec<Record>> {
        let path = format!(
            "{}/issues?state=all&per_page={}&page={}",
            self.repo_path(owner),
            self.config.per_page,
            page
        );
        self.request(ApiRequest::get(path).with_token(token)).await
    }

    /// Find the first record whose title equals `title` exactly.
    ///
    /// Walks pages until a short page, a match, or `max_pages`.
    pub async fn find_record(&self, token: &str, owner: &str, title: &str) -> Result<Option<Record>> {
        for page in 1..=self.config.max_pages {
            let records = self.list_records(token, owner, page).await?;
            let page_len = records.len();

            if let Some(record) = records
                .into_iter()
                .find(|r| r.pull_request.is_none() && r.title == title)
            {
                tracing::debug!("Found record #{} on page {}", record.number, page);
                return Ok(Some(record));
            }

            if page_len < self.config.per_page as usize {
                return Ok(None);
            }
        }

        tracing::warn!(
            "Stopped searching for '{}' after {} pages",
            title,
            self.config.max_pages
        );
        Ok(None)
    }

    pub async fn create_record(&self, token: &str, owner: &str, title: &str, body: &str) -> Result<Record> {
        self.request(
            ApiRequest::new(Method::Post, format!("{}/issues", self.repo_path(owner)))
                .with_body(json!({ "title": title, "body": body }))
                .with_token(token),
        )
        .await
    }

    pub async fn update_record(
        &self,
        token: &str,
        owner: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Record> {
        self.request(
            ApiRequest::new(
                Method::Patch,
                format!("{}/issues/{}", self.repo_path(owner), number),
            )
            .with_body(json!({ "title": title, "body": body }))
            .with_token(token),
        )
        .await
    }

    pub async fn add_label(&self, token: &str, owner: &str, number: u64, label: &str) -> Result<()> {
        let _: Value = self
            .request(
                ApiRequest::new(
                    Method::Post,
                    format!("{}/issues/{}/labels", self.repo_path(owner), number),
                )
                .with_body(json!([label]))
                .with_token(token),
            )
            .await?;
        Ok(())
    }
}

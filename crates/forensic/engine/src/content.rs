use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::AuditError;

pub const DEFAULT_CONTENT_GATEWAY: &str = "https://arweave.net";

/// Resolves a ledger content pointer to the recipe document.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, pointer: &str) -> Result<String, AuditError>;
}

/// Permanent-storage gateway over HTTP.
///
/// Pointers may be bare content ids, `ar://<cid>` or full URLs. Documents must
/// be JSON; they are handed to the silos pretty-printed.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: Client,
    gateway: String,
}

impl HttpContentStore {
    pub fn new(gateway: impl Into<String>, timeout: Duration) -> Result<Self, AuditError> {
        let gateway = gateway.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AuditError::ContentUnavailable {
                pointer: gateway.clone(),
                reason: format!("client build failed: {e}"),
            }
        })?;
        Ok(Self { client, gateway })
    }

    pub fn url_for(&self, pointer: &str) -> String {
        let pointer = pointer.trim();
        if pointer.starts_with("http://") || pointer.starts_with("https://") {
            return pointer.to_string();
        }
        let cid = pointer.strip_prefix("ar://").unwrap_or(pointer);
        format!("{}/{}", self.gateway, cid.trim_start_matches('/'))
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn fetch(&self, pointer: &str) -> Result<String, AuditError> {
        let unavailable = |reason: String| AuditError::ContentUnavailable {
            pointer: pointer.to_string(),
            reason,
        };
        if pointer.trim().is_empty() {
            return Err(unavailable("empty content pointer".into()));
        }

        let url = self.url_for(pointer);
        debug!(%url, "fetching recipe content");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("gateway returned HTTP {status}")));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| unavailable(format!("content is not JSON: {e}")))?;
        serde_json::to_string_pretty(&document).map_err(|e| unavailable(e.to_string()))
    }
}

/// In-memory pointer map for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct StaticContentStore {
    documents: HashMap<String, String>,
}

impl StaticContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pointer: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.insert(pointer.into(), content.into());
        self
    }
}

#[async_trait]
impl ContentStore for StaticContentStore {
    async fn fetch(&self, pointer: &str) -> Result<String, AuditError> {
        self.documents
            .get(pointer)
            .cloned()
            .ok_or_else(|| AuditError::ContentUnavailable {
                pointer: pointer.to_string(),
                reason: "no such document".into(),
            })
    }
}

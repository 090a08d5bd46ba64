use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::error::CompletionError;
use crate::request::CompletionRequest;

pub const DEFAULT_ENDPOINT: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_AUTH_ENV_VAR: &str = "XAI_API_KEY";

/// Raw response body, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, CompletionError>>;

/// Opens the streaming body for one completion request.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn open(&self, request: &CompletionRequest) -> Result<ByteStream, CompletionError>;
}

/// reqwest transport for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                CompletionError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a transport whose bearer token comes from `env_var`.
    pub fn from_env(
        endpoint: impl Into<String>,
        env_var: &str,
        connect_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let api_key = std::env::var(env_var)
            .map_err(|_| CompletionError::InvalidConfig(format!("missing {}", env_var)))?;
        if api_key.trim().is_empty() {
            return Err(CompletionError::InvalidConfig(format!("{} is empty", env_var)));
        }
        Self::new(endpoint, api_key, connect_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn open(&self, request: &CompletionRequest) -> Result<ByteStream, CompletionError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "opening completion stream");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.to_payload())
            .send()
            .await
            .map_err(|e| {
                CompletionError::unavailable(
                    e.status().map(|s| s.as_u16()),
                    format!("request failed: {}", e),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::unavailable(
                Some(status.as_u16()),
                truncate(&body, 320),
            ));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CompletionError::Stream(e.to_string())));
        Ok(stream.boxed())
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn from_env_requires_key() {
        let err = HttpTransport::from_env(
            DEFAULT_ENDPOINT,
            "FORENSIC_TEST_KEY_THAT_IS_NEVER_SET",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, CompletionError::InvalidConfig(_)));
    }
}

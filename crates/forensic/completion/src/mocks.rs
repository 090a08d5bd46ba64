//! Test doubles for the completion boundary.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::client::CompletionService;
use crate::error::CompletionError;
use crate::request::CompletionRequest;
use crate::transport::{ByteStream, CompletionTransport};

/// One well-formed event-stream frame carrying `content`.
pub fn sse_frame(content: &str) -> String {
    let envelope = serde_json::json!({
        "choices": [{ "delta": { "content": content } }]
    });
    format!("data: {}\n\n", envelope)
}

/// Transport that replays fixed body chunks.
pub struct ChunkedTransport {
    chunks: Vec<String>,
    failure: Option<CompletionError>,
    hang: bool,
}

impl ChunkedTransport {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            failure: None,
            hang: false,
        }
    }

    /// Fails at `open`, before any byte is read.
    pub fn failing(error: CompletionError) -> Self {
        Self {
            chunks: Vec::new(),
            failure: Some(error),
            hang: false,
        }
    }

    /// Keep the stream open forever once the chunks are exhausted.
    pub fn hang_after_chunks(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl CompletionTransport for ChunkedTransport {
    async fn open(&self, _request: &CompletionRequest) -> Result<ByteStream, CompletionError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let chunks: Vec<Result<Bytes, CompletionError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        let body = stream::iter(chunks);
        if self.hang {
            Ok(body.chain(stream::pending()).boxed())
        } else {
            Ok(body.boxed())
        }
    }
}

struct Rule {
    needle: String,
    reply: Result<String, CompletionError>,
}

/// Completion service answering by substring match on the system prompt or label.
///
/// Every call is recorded so tests can assert which stages ran.
pub struct ScriptedCompletion {
    rules: Vec<Rule>,
    fallback: Result<String, CompletionError>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Err(CompletionError::unavailable(None, "no scripted reply")),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Ok(reply.into()),
        });
        self
    }

    pub fn fail_when(mut self, needle: impl Into<String>, error: CompletionError) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Err(error),
        });
        self
    }

    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Ok(reply.into());
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Calls whose system prompt or label contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches_rule(c, needle))
            .count()
    }
}

fn matches_rule(request: &CompletionRequest, needle: &str) -> bool {
    request.system_prompt.contains(needle)
        || request
            .label
            .as_deref()
            .map(|l| l.contains(needle))
            .unwrap_or(false)
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        self.rules
            .iter()
            .find(|rule| matches_rule(request, &rule.needle))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

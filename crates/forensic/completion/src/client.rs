use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::CompletionError;
use crate::observer::{FragmentObserver, NoopObserver};
use crate::request::CompletionRequest;
use crate::sse::{SseDecoder, SseEvent};
use crate::transport::CompletionTransport;

/// The contract every pipeline stage depends on: one request in, full text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Folds an event-stream response into text.
#[derive(Clone)]
pub struct StreamingCompletionClient {
    transport: Arc<dyn CompletionTransport>,
    observer: Arc<dyn FragmentObserver>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for StreamingCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCompletionClient")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StreamingCompletionClient {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            observer: Arc::new(NoopObserver),
            timeout: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FragmentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound on the whole call, from request to final fragment.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn stream_to_text(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let label = request.display_label();
        let mut stream = self.transport.open(request).await?;
        self.observer.on_start(label, &request.model);

        let mut decoder = SseDecoder::new();
        let mut text = String::new();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                match event {
                    SseEvent::Fragment(fragment) => {
                        self.observer.on_fragment(label, &fragment);
                        text.push_str(&fragment);
                    }
                    SseEvent::Done => break 'read,
                }
            }
        }

        if !decoder.is_done() {
            if let Some(SseEvent::Fragment(fragment)) = decoder.finish() {
                self.observer.on_fragment(label, &fragment);
                text.push_str(&fragment);
            }
            if !decoder.is_done() {
                debug!(label, "stream closed without a completion marker");
            }
        }

        if decoder.skipped() > 0 {
            debug!(label, skipped = decoder.skipped(), "malformed fragments skipped");
        }
        self.observer.on_complete(label, text.chars().count());
        Ok(text)
    }
}

#[async_trait]
impl CompletionService for StreamingCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.stream_to_text(request))
                .await
                .unwrap_or(Err(CompletionError::Timeout { after: limit })),
            None => self.stream_to_text(request).await,
        };

        if let Err(e) = &result {
            warn!(label = request.display_label(), error = %e, "completion call failed");
        }
        result
    }
}

//! Streaming completion client for the scoring service.
//!
//! One call opens one chat-completion request with `stream: true` and folds the
//! returned event stream into the full response text:
//! - [`CompletionTransport`] opens the byte stream (reqwest in [`HttpTransport`])
//! - [`SseDecoder`] turns raw bytes into text fragments, skipping malformed ones
//! - [`StreamingCompletionClient`] concatenates fragments, enforces the per-call
//!   timeout and mirrors fragments to an optional [`FragmentObserver`]
//!
//! Everything above this crate talks to the [`CompletionService`] trait, so
//! stages can be driven by [`mocks::ScriptedCompletion`] in tests.

pub mod client;
pub mod error;
pub mod mocks;
pub mod observer;
pub mod request;
pub mod sse;
pub mod transport;

pub use client::{CompletionService, StreamingCompletionClient};
pub use error::CompletionError;
pub use observer::{FragmentObserver, NoopObserver, StdoutObserver};
pub use request::CompletionRequest;
pub use sse::{SseDecoder, SseEvent};
pub use transport::{ByteStream, CompletionTransport, HttpTransport};

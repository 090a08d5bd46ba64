//! Incremental decoder for `text/event-stream` completion bodies.
//!
//! Network chunks do not respect line boundaries, so partial lines are kept
//! in a buffer until their terminating newline arrives.

use serde::Deserialize;
use tracing::debug;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// A decoded unit from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    skipped: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `data:` lines that were not valid JSON envelopes.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning every complete event it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        if self.done {
            return None;
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();

        if payload == DONE_MARKER {
            self.done = true;
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<ChunkEnvelope>(payload) {
            Ok(envelope) => {
                let text: String = envelope
                    .choices
                    .into_iter()
                    .filter_map(|c| c.delta.and_then(|d| d.content))
                    .collect();
                (!text.is_empty()).then_some(SseEvent::Fragment(text))
            }
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "skipping malformed stream fragment");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn decodes_fragments_in_order() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}{}data: [DONE]\n", frame("Hello"), frame(", world"));
        let events = decoder.push(body.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Fragment("Hello".into()),
                SseEvent::Fragment(", world".into()),
                SseEvent::Done,
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let body = frame("split");
        let (a, b) = body.split_at(17);
        assert!(decoder.push(a.as_bytes()).is_empty());
        assert_eq!(
            decoder.push(b.as_bytes()),
            vec![SseEvent::Fragment("split".into())]
        );
    }

    #[test]
    fn malformed_fragments_are_skipped() {
        let mut decoder = SseDecoder::new();
        let body = format!("data: {{not json\n{}: keep-alive\n\n{}", frame("ok"), frame("!"));
        let events = decoder.push(body.as_bytes());
        assert_eq!(
            events,
            vec![SseEvent::Fragment("ok".into()), SseEvent::Fragment("!".into())]
        );
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn role_only_and_crlf_frames_are_handled() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n";
        assert_eq!(
            decoder.push(body.as_bytes()),
            vec![SseEvent::Fragment("x".into())]
        );
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn nothing_after_done() {
        let mut decoder = SseDecoder::new();
        let body = format!("data: [DONE]\n{}", frame("late"));
        assert_eq!(decoder.push(body.as_bytes()), vec![SseEvent::Done]);
    }
}

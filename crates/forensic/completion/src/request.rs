use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Display label for observers, e.g. `SILO A: TOIL`.
    #[serde(default)]
    pub label: Option<String>,
}

impl CompletionRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.05;

    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: None,
            label: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.model)
    }

    /// OpenAI-compatible streaming payload.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": self.user_content },
            ],
            "temperature": self.temperature,
            "stream": true,
        });
        if let Some(max_tokens) = self.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_streaming_chat() {
        let payload = CompletionRequest::new("grok-4", "sys", "user")
            .temperature(0.0)
            .to_payload();
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["messages"][0]["role"], json!("system"));
        assert_eq!(payload["messages"][1]["content"], json!("user"));
        assert!(payload.get("max_tokens").is_none());
    }

    #[test]
    fn max_tokens_only_when_set() {
        let payload = CompletionRequest::new("m", "s", "u")
            .max_tokens(Some(600))
            .to_payload();
        assert_eq!(payload["max_tokens"], json!(600));
    }

    #[test]
    fn label_falls_back_to_model() {
        let req = CompletionRequest::new("grok-4", "s", "u");
        assert_eq!(req.display_label(), "grok-4");
        assert_eq!(req.labeled("JURY").display_label(), "JURY");
    }
}

use serde::{Deserialize, Serialize};

/// A single-turn completion request: one system instruction, one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    pub user_text: String,
    pub temperature: f64,
    /// Output token cap. Unset leaves the model's own limit in place.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_instruction: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            user_text: user_text.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A text message pulled out of a webhook payload, ready for the reply pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
    /// Platform message id, when the payload carries one.
    pub mid: Option<String>,
}

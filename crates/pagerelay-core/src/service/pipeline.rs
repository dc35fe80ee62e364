use std::sync::Arc;

use tracing::{debug, error, info};

use crate::channel::MessageSender;
use crate::config::Config;
use crate::error::{CompletionError, ConfigError};
use crate::provider::CompletionProvider;
use crate::types::{CompletionRequest, InboundMessage};
use crate::util::truncate_string;

/// Fixed per-process completion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplySettings {
    pub model: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl ReplySettings {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            model: cfg.completion.model.clone(),
            system_instruction: cfg.system_instruction()?,
            temperature: cfg.completion.temperature,
            max_tokens: cfg.completion.max_tokens,
        })
    }

    fn request_for(&self, user_text: &str) -> CompletionRequest {
        let request = CompletionRequest::new(&self.model, &self.system_instruction, user_text)
            .with_temperature(self.temperature);
        match self.max_tokens {
            Some(max_tokens) => request.with_max_tokens(max_tokens),
            None => request,
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Delivered,
    CompletionFailed,
    DeliveryFailed,
}

/// Completion → send, one message at a time. Failures stay inside `handle`.
pub struct ReplyPipeline {
    provider: Arc<dyn CompletionProvider>,
    sender: Arc<dyn MessageSender>,
    settings: ReplySettings,
}

impl ReplyPipeline {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        sender: Arc<dyn MessageSender>,
        settings: ReplySettings,
    ) -> Self {
        Self {
            provider,
            sender,
            settings,
        }
    }

    pub fn settings(&self) -> &ReplySettings {
        &self.settings
    }

    /// Run the completion step alone.
    pub async fn complete(&self, user_text: &str) -> Result<String, CompletionError> {
        self.provider
            .complete(&self.settings.request_for(user_text))
            .await
    }

    /// Reply to one message. No retries: at most one completion call and at
    /// most one send call. The send only starts after the completion resolved.
    pub async fn handle(&self, msg: &InboundMessage) -> ReplyOutcome {
        debug!(
            "Message from {} (mid={}): {}",
            msg.sender_id,
            msg.mid.as_deref().unwrap_or("-"),
            truncate_string(&msg.text, 80, "...")
        );

        let reply = match self.complete(&msg.text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    "Error generating response via {} for {}: {}",
                    self.provider.name(),
                    msg.sender_id,
                    e
                );
                return ReplyOutcome::CompletionFailed;
            }
        };

        match self.sender.send_text(&msg.sender_id, &reply).await {
            Ok(()) => {
                info!("Replied to {} via {}", msg.sender_id, self.sender.name());
                ReplyOutcome::Delivered
            }
            Err(e) => {
                error!("Unable to send message to {}: {}", msg.sender_id, e);
                ReplyOutcome::DeliveryFailed
            }
        }
    }
}

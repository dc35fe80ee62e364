use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::FacebookConfig;
use crate::error::{DeliverySendError, MalformedEvent};
use crate::types::InboundMessage;

use super::MessageSender;

// ====== Facebook Messenger Webhook Types ======

/// Facebook webhook event envelope.
///
/// Entries stay as raw JSON so one bad entry does not sink the whole batch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FacebookWebhookEvent {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<serde_json::Value>,
}

/// A single entry in the webhook event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FacebookEntry {
    pub id: Option<String>,
    pub time: Option<i64>,
    /// Kept raw; only index 0 is ever decoded.
    pub messaging: Option<Vec<serde_json::Value>>,
}

/// A messaging event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FacebookMessaging {
    pub sender: Option<FacebookUser>,
    pub recipient: Option<FacebookUser>,
    pub timestamp: Option<i64>,
    pub message: Option<FacebookMessage>,
}

/// Facebook user reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FacebookUser {
    pub id: String,
}

/// Facebook message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FacebookMessage {
    pub mid: Option<String>,
    pub text: Option<String>,
}

impl FacebookWebhookEvent {
    /// Page subscriptions are the only object type this relay answers.
    pub fn is_page(&self) -> bool {
        self.object == "page"
    }

    /// Decode each entry, keeping per-entry failures separate.
    pub fn entries(&self) -> impl Iterator<Item = Result<FacebookEntry, MalformedEvent>> + '_ {
        self.entry.iter().enumerate().map(|(index, raw)| {
            serde_json::from_value(raw.clone()).map_err(|source| MalformedEvent { index, source })
        })
    }
}

impl FacebookEntry {
    /// Messenger documents one event per entry, so only index 0 is read.
    /// Any further events in the same entry are ignored and never decoded.
    pub fn first_event(&self) -> Result<Option<FacebookMessaging>, serde_json::Error> {
        match self.messaging.as_ref().and_then(|m| m.first()) {
            Some(raw) => serde_json::from_value(raw.clone()).map(Some),
            None => Ok(None),
        }
    }
}

impl FacebookMessaging {
    /// The text message carried by this event, if any. Attachments, read and
    /// delivery receipts and empty text all yield `None`.
    pub fn text_message(&self) -> Option<InboundMessage> {
        let sender = self.sender.as_ref()?;
        let message = self.message.as_ref()?;
        let text = message.text.as_deref().filter(|t| !t.is_empty())?;
        Some(InboundMessage {
            sender_id: sender.id.clone(),
            text: text.to_string(),
            mid: message.mid.clone(),
        })
    }
}

// ====== Send API ======

/// Send API request body.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub recipient: SendRecipient<'a>,
    pub message: SendMessage<'a>,
    pub messaging_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendRecipient<'a> {
    pub id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub text: &'a str,
}

impl<'a> SendRequest<'a> {
    pub fn response(recipient_id: &'a str, text: &'a str) -> Self {
        Self {
            recipient: SendRecipient { id: recipient_id },
            message: SendMessage { text },
            messaging_type: "RESPONSE",
        }
    }
}

pub struct FacebookSender {
    client: reqwest::Client,
    page_access_token: String,
    endpoint: String,
}

impl FacebookSender {
    pub fn new(client: reqwest::Client, cfg: &FacebookConfig) -> Self {
        let endpoint = format!(
            "{}/{}/me/messages",
            cfg.graph_api_base.trim_end_matches('/'),
            cfg.graph_api_version
        );
        Self {
            client,
            page_access_token: cfg.page_access_token.clone(),
            endpoint,
        }
    }

    /// Parse a Facebook webhook event from JSON body.
    pub fn parse_webhook_event(body: &str) -> Result<FacebookWebhookEvent, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Pull the Graph API error message out of an error body, if present.
    fn graph_error_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.to_string())
    }
}

#[async_trait]
impl MessageSender for FacebookSender {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<(), DeliverySendError> {
        if self.page_access_token.is_empty() {
            return Err(DeliverySendError::NoAccessToken);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("access_token", self.page_access_token.as_str())])
            .json(&SendRequest::response(recipient_id, text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Facebook Send API error {}: {}", status, body);
            return Err(DeliverySendError::Api {
                status: status.as_u16(),
                message: Self::graph_error_message(&body),
            });
        }

        info!("Reply delivered to {}", recipient_id);
        Ok(())
    }
}

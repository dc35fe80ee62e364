pub mod facebook;

use async_trait::async_trait;

use crate::error::DeliverySendError;

/// Trait for push-messaging backends that deliver a reply to one recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Channel name (e.g., "facebook").
    fn name(&self) -> &str;

    /// Deliver `text` to `recipient_id` with a single API call.
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<(), DeliverySendError>;
}

pub mod gemini;

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::types::CompletionRequest;

/// Trait for text completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a reply for one user message under one system instruction.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Provider name for logs (e.g., "gemini").
    fn name(&self) -> &str;
}

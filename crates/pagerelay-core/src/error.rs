use std::path::PathBuf;

/// Core error types for pagerelay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliverySendError),

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] MalformedEvent),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Webhook subscription handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("hub.mode or hub.verify_token missing")]
    MissingParams,

    #[error("verify token mismatch")]
    Mismatch,
}

/// A single webhook entry that could not be decoded. Never surfaced to the platform.
#[derive(Debug, thiserror::Error)]
#[error("entry {index}: {source}")]
pub struct MalformedEvent {
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Completion returned no text")]
    Empty,

    #[error("No API key configured for completion provider")]
    NoApiKey,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliverySendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Send API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No page access token configured")]
    NoAccessToken,
}

pub type Result<T> = std::result::Result<T, RelayError>;

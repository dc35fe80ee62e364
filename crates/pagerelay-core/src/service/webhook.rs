use serde::Deserialize;
use tracing::{debug, info};

use crate::channel::facebook::{FacebookEntry, FacebookWebhookEvent};
use crate::error::{MalformedEvent, VerificationError};
use crate::types::InboundMessage;

use super::pipeline::{ReplyOutcome, ReplyPipeline};

// ====== Verification handshake ======

/// Query parameters of `GET /webhook`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Answer the subscription handshake. On success returns the challenge to
/// echo back verbatim. Empty values count as absent.
pub fn verify_subscription(
    params: &VerifyParams,
    expected_token: &str,
) -> Result<String, VerificationError> {
    let mode = params.mode.as_deref().filter(|s| !s.is_empty());
    let token = params.verify_token.as_deref().filter(|s| !s.is_empty());

    let (mode, token) = match (mode, token) {
        (Some(mode), Some(token)) => (mode, token),
        _ => return Err(VerificationError::MissingParams),
    };

    if mode != "subscribe" || expected_token.is_empty() || token != expected_token {
        return Err(VerificationError::Mismatch);
    }

    info!("WEBHOOK_VERIFIED");
    Ok(params.challenge.clone().unwrap_or_default())
}

// ====== Event ingestion ======

/// Per-request tally, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub entries: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// `object` was not "page"; nothing was processed.
    NotPage,
    Processed(IngestReport),
}

enum EntryContent {
    Message(InboundMessage),
    NoText,
    Malformed,
}

fn classify(entry: Result<FacebookEntry, MalformedEvent>) -> EntryContent {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Skipping malformed webhook entry: {}", e);
            return EntryContent::Malformed;
        }
    };

    let first = match entry.first_event() {
        Ok(first) => first,
        Err(e) => {
            debug!(
                "Skipping entry {} with malformed first event: {}",
                entry.id.as_deref().unwrap_or("-"),
                e
            );
            return EntryContent::Malformed;
        }
    };

    match first.and_then(|ev| ev.text_message()) {
        Some(msg) => EntryContent::Message(msg),
        None => {
            debug!(
                "Skipping entry {} without a text message",
                entry.id.as_deref().unwrap_or("-")
            );
            EntryContent::NoText
        }
    }
}

/// Text messages in `event`, one at most per entry, in payload order.
pub fn extract_messages(event: &FacebookWebhookEvent) -> Vec<InboundMessage> {
    event
        .entries()
        .filter_map(|entry| match classify(entry) {
            EntryContent::Message(msg) => Some(msg),
            EntryContent::NoText | EntryContent::Malformed => None,
        })
        .collect()
}

/// Feed every text message in `event` through `pipeline`, sequentially.
/// Pipeline failures are counted, never returned.
pub async fn ingest(event: &FacebookWebhookEvent, pipeline: &ReplyPipeline) -> IngestOutcome {
    if !event.is_page() {
        debug!("Ignoring webhook for object {:?}", event.object);
        return IngestOutcome::NotPage;
    }

    let mut report = IngestReport {
        entries: event.entry.len(),
        ..IngestReport::default()
    };

    for entry in event.entries() {
        match classify(entry) {
            EntryContent::Message(msg) => {
                report.dispatched += 1;
                match pipeline.handle(&msg).await {
                    ReplyOutcome::Delivered => report.delivered += 1,
                    ReplyOutcome::CompletionFailed | ReplyOutcome::DeliveryFailed => {
                        report.failed += 1
                    }
                }
            }
            EntryContent::NoText => report.skipped += 1,
            EntryContent::Malformed => report.malformed += 1,
        }
    }

    IngestOutcome::Processed(report)
}

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channel::facebook::{FacebookSender, FacebookWebhookEvent};
use crate::channel::MessageSender;
use crate::config::Config;
use crate::error::{ConfigError, RelayError, VerificationError};
use crate::provider::gemini::GeminiProvider;
use crate::provider::CompletionProvider;
use crate::service::pipeline::{ReplyPipeline, ReplySettings};
use crate::service::webhook::{ingest, verify_subscription, IngestOutcome, VerifyParams};
use crate::util::http::build_client;

/// Acknowledgement body Messenger expects on every accepted delivery.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared, read-only application state.
pub struct AppState {
    pub config: Config,
    pub pipeline: ReplyPipeline,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the production Gemini provider and Facebook sender from config.
    pub fn from_config(config: Config) -> Result<Self, RelayError> {
        let client = build_client(&config.http)
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        let provider: Arc<dyn CompletionProvider> = Arc::new(GeminiProvider::new(
            client.clone(),
            config.completion.api_key.clone(),
            config.completion.api_base.clone(),
        ));
        let sender: Arc<dyn MessageSender> =
            Arc::new(FacebookSender::new(client, &config.facebook));

        Self::new(config, provider, sender)
    }

    /// Build state around any provider/sender pair.
    pub fn new(
        config: Config,
        provider: Arc<dyn CompletionProvider>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self, RelayError> {
        let settings = ReplySettings::from_config(&config)?;
        Ok(Self {
            pipeline: ReplyPipeline::new(provider, sender, settings),
            config,
            started_at: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: i64,
}

/// Create the axum Router with the webhook routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/webhook", get(handle_verify).post(handle_webhook))
        .route("/health", get(handle_health));

    if state.config.server.status_page {
        router = router.route("/", get(handle_status_page));
    }

    router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /webhook - subscription handshake
async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match verify_subscription(&params, &state.config.facebook.verify_token) {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(VerificationError::Mismatch) => {
            warn!("Webhook verification rejected: token mismatch");
            StatusCode::FORBIDDEN.into_response()
        }
        Err(VerificationError::MissingParams) => {
            warn!("Webhook verification rejected: missing parameters");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// POST /webhook - Messenger events
async fn handle_webhook(State(state): State<Arc<AppState>>, body: String) -> Response {
    info!("Facebook webhook received: {} bytes", body.len());

    let event: FacebookWebhookEvent = match FacebookSender::parse_webhook_event(&body) {
        Ok(event) => event,
        Err(e) => {
            error!("Failed to parse Facebook webhook: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match ingest(&event, &state.pipeline).await {
        IngestOutcome::NotPage => StatusCode::NOT_FOUND.into_response(),
        IngestOutcome::Processed(report) => {
            info!(
                "Webhook processed: {} entries, {} dispatched, {} delivered, {} failed, {} skipped, {} malformed",
                report.entries,
                report.dispatched,
                report.delivered,
                report.failed,
                report.skipped,
                report.malformed
            );
            (StatusCode::OK, EVENT_RECEIVED).into_response()
        }
    }
}

/// GET / - Status page
async fn handle_status_page() -> impl IntoResponse {
    Html(include_str!("../../../../web/status.html"))
}

/// GET /health - Health check
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook is listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

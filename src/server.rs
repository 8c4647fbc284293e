//! HTTP transport: the push variant of the stream adapter.
//!
//! `POST /chat/stream` runs one turn and frames each text delta as an SSE
//! chunk, flushed per fragment; the response stream closes on `Done` or
//! `Error`. A disconnected caller drops the response stream, which the
//! orchestrator observes as cancellation within one emission cycle.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{run_turn, Fragment};
use crate::config::GatewayConfig;
use crate::inference::types::{ChatMessage, Role};
use crate::inference::{InferenceClient, ModelBackend};
use crate::provider::{FunctionRegistry, ProviderSession};

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ModelBackend>,
    pub config: Arc<GatewayConfig>,
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

/// Inbound chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Optional client identity hint, logged for observability.
    #[serde(default)]
    pub client: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
}

/// JSON error body for request-level failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /health`
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.config.model.model.clone(),
    })
}

/// `POST /chat/stream`
///
/// Opens a fresh tool provider session for the request, builds the
/// registry, and streams the turn's text deltas back as SSE data events.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    tracing::info!(
        client = request.client.as_deref().unwrap_or("unknown"),
        history_len = request.history.len(),
        "chat turn requested"
    );

    // Fresh session per request; the orchestrator guarantees its release.
    let session = ProviderSession::open(&state.config.provider)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    let registry = match FunctionRegistry::register(Box::new(session)) {
        Ok(registry) => registry,
        Err(failure) => {
            let _ = failure.session.close().await;
            return Err(api_error(StatusCode::BAD_GATEWAY, failure.error.to_string()));
        }
    };

    let transcript = build_transcript(&state.config, request.history, &request.message);

    let fragments = run_turn(
        state.model.clone(),
        registry,
        transcript,
        state.config.turn_limits(),
    );

    let sse_stream = fragments.filter_map(|fragment| async move {
        match fragment {
            Fragment::Text { delta } => {
                // Event::data splits embedded newlines across data: lines;
                // carriage returns are not representable in SSE.
                Some(Ok(Event::default().data(delta.replace('\r', ""))))
            }
            Fragment::Error { kind, message } => {
                Some(Ok(Event::default().event("error").data(format!("{kind}: {message}"))))
            }
            // Tool activity is logged by the orchestrator, not streamed;
            // Done simply ends the channel.
            Fragment::ToolCallRequested { .. } | Fragment::ToolResult { .. } => None,
            Fragment::Done { .. } => None,
        }
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// Prepend the configured system prompt (when the caller didn't supply
/// one) and append the pending user message.
fn build_transcript(
    config: &GatewayConfig,
    history: Vec<ChatMessage>,
    message: &str,
) -> Vec<ChatMessage> {
    let mut transcript = Vec::with_capacity(history.len() + 2);

    if let Some(prompt) = &config.system_prompt {
        let caller_has_system = history.first().is_some_and(|m| m.role == Role::System);
        if !caller_has_system {
            transcript.push(ChatMessage::text(Role::System, prompt));
        }
    }

    transcript.extend(history);
    transcript.push(ChatMessage::text(Role::User, message));
    transcript
}

// ─── Router & entry point ────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/chat/stream", post(chat_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until shutdown.
pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let model = Arc::new(InferenceClient::new(config.model_settings())?);
    let bind_addr = config.server.bind_addr.clone();

    let state = AppState {
        model,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "gateway listening");
    tracing::info!("  GET  /health       - health check");
    tracing::info!("  POST /chat/stream  - streaming chat turn");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

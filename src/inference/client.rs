//! Client for the OpenAI-compatible chat completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::streaming::parse_sse_stream;
use super::types::{ChatCompletionRequest, ChatMessage, StreamChunk, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whole-request timeout for streaming responses. Generous because the
/// model may stream for a long time on large answers.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── ModelBackend ────────────────────────────────────────────────────────────

/// A boxed stream of incremental model events for one response.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, InferenceError>>;

/// The model boundary the orchestrator drives.
///
/// One call = one model response: the full transcript plus the current
/// tool schemas go in, a lazy token/tool-call stream comes out.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn begin_turn(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChunkStream, InferenceError>;
}

// ─── Model endpoint settings ─────────────────────────────────────────────────

/// Endpoint identity and sampling defaults, injected from configuration.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// HTTP client for the chat completion endpoint.
pub struct InferenceClient {
    http: HttpClient,
    settings: ModelSettings,
}

impl InferenceClient {
    /// Build a client for the configured endpoint.
    pub fn new(settings: ModelSettings) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }
}

#[async_trait]
impl ModelBackend for InferenceClient {
    async fn begin_turn(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChunkStream, InferenceError> {
        let url = format!("{}/chat/completions", self.settings.base_url);

        let body = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: true,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "model request"
        );

        let mut request = self
            .http
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream");
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: STREAM_REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_sse_stream(response).boxed())
    }
}

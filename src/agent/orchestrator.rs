//! The turn orchestrator — the agent loop.
//!
//! Drives one turn: streams the model's response, forwards text deltas as
//! fragments the moment they arrive, executes requested tool calls through
//! the registry, feeds results back, and repeats until the model answers
//! without tools or the iteration guard trips.
//!
//! The loop runs as a spawned task feeding a bounded channel. Every
//! fragment send is fallible: a dropped receiver (caller disconnect) is
//! observed within one emission cycle and aborts the turn. The registry —
//! and with it the provider session — is closed on every exit path.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::inference::types::{ChatMessage, ToolCall};
use crate::inference::ModelBackend;
use crate::provider::{FunctionRegistry, InvokeOutcome};

use super::errors::TurnError;
use super::fragment::Fragment;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default maximum tool-invoking rounds per turn.
const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Default cap on tool result characters entering the transcript.
const DEFAULT_TOOL_RESULT_LIMIT: usize = 6_000;

/// Fragment channel capacity. Small: the producer should stay roughly in
/// step with delivery so disconnects are noticed quickly.
const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Per-turn policy knobs, injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    /// Tool-invoking rounds before the turn fails with `ToolLoopExceeded`.
    pub max_tool_rounds: usize,
    /// Character cap for a single tool result in the transcript.
    pub tool_result_limit: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_result_limit: DEFAULT_TOOL_RESULT_LIMIT,
        }
    }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Run one turn, returning the lazy fragment stream.
///
/// `transcript` is the caller's history snapshot including the pending
/// user message; the orchestrator mutates only its own copy, so the
/// caller's conversation is untouched unless it folds in the `Done`
/// message itself. Takes ownership of the registry and guarantees its
/// session is closed when the turn ends, however it ends.
pub fn run_turn(
    model: Arc<dyn ModelBackend>,
    registry: FunctionRegistry,
    transcript: Vec<ChatMessage>,
    limits: TurnLimits,
) -> ReceiverStream<Fragment> {
    let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let sink = FragmentSink { tx };

        let outcome = drive_turn(model.as_ref(), &registry, transcript, limits, &sink).await;

        match outcome {
            Ok(assembled) => {
                let _ = sink.try_terminal(Fragment::Done { message: assembled }).await;
            }
            Err(TurnError::Disconnected) => {
                // Nobody left to report to.
                tracing::debug!("turn cancelled: caller disconnected");
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "turn failed");
                let _ = sink
                    .try_terminal(Fragment::Error {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    })
                    .await;
            }
        }

        if let Err(e) = registry.close().await {
            tracing::warn!(error = %e, "tool provider session close failed");
        }
    });

    ReceiverStream::new(rx)
}

// ─── The loop ────────────────────────────────────────────────────────────────

async fn drive_turn(
    model: &dyn ModelBackend,
    registry: &FunctionRegistry,
    mut transcript: Vec<ChatMessage>,
    limits: TurnLimits,
    sink: &FragmentSink,
) -> Result<String, TurnError> {
    let schemas = if registry.is_empty() {
        None
    } else {
        Some(registry.schemas())
    };

    let mut assembled = String::new();

    for round in 0..limits.max_tool_rounds {
        let mut stream = model.begin_turn(transcript.clone(), schemas.clone()).await?;

        let mut round_text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            if let Some(token) = chunk.token {
                sink.send(Fragment::Text {
                    delta: token.clone(),
                })
                .await?;
                round_text.push_str(&token);
            }

            if let Some(calls) = chunk.tool_calls {
                tool_calls.extend(calls);
            }

            if chunk.finish_reason.is_some() {
                break;
            }
        }
        // Dropping the stream closes the model connection promptly.
        drop(stream);

        assembled.push_str(&round_text);

        if tool_calls.is_empty() {
            return Ok(assembled);
        }

        tracing::info!(
            round = round + 1,
            calls = tool_calls.len(),
            "model requested tool round"
        );

        let mut assistant = ChatMessage::assistant_tool_calls(&tool_calls);
        if !round_text.is_empty() {
            assistant.content = Some(round_text);
        }
        transcript.push(assistant);

        // Sequential, in the model's listed order: tool side effects may
        // not be independent.
        for call in &tool_calls {
            sink.send(Fragment::ToolCallRequested {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await?;

            // Race the invocation against channel closure: a departed
            // caller cancels an in-flight tool call instead of letting it
            // run out its timeout while holding the session.
            let outcome = tokio::select! {
                _ = sink.closed() => return Err(TurnError::Disconnected),
                outcome = registry.invoke(call) => outcome,
            };
            let (output, is_error) = match outcome {
                InvokeOutcome::Fatal(e) => return Err(TurnError::from_provider(e)),
                outcome => {
                    let is_error = outcome.is_error();
                    (outcome.model_text().unwrap_or_default(), is_error)
                }
            };

            let output = truncate_tool_result(&call.name, output, limits.tool_result_limit);
            transcript.push(ChatMessage::tool_result(&call.id, &output));

            sink.send(Fragment::ToolResult {
                call_id: call.id.clone(),
                output,
                is_error,
            })
            .await?;
        }
    }

    Err(TurnError::ToolLoopExceeded {
        rounds: limits.max_tool_rounds,
    })
}

/// Cap a tool result before it enters the transcript.
fn truncate_tool_result(tool: &str, text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    tracing::warn!(
        tool,
        chars = text.chars().count(),
        limit,
        "tool result truncated"
    );
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("\n...(truncated)");
    truncated
}

// ─── Fragment sink ───────────────────────────────────────────────────────────

/// Fallible fragment emitter backed by the turn's channel.
struct FragmentSink {
    tx: mpsc::Sender<Fragment>,
}

impl FragmentSink {
    /// Emit a fragment; a closed receiver means the caller is gone.
    async fn send(&self, fragment: Fragment) -> Result<(), TurnError> {
        self.tx
            .send(fragment)
            .await
            .map_err(|_| TurnError::Disconnected)
    }

    /// Emit a terminal fragment, ignoring a concurrent disconnect.
    async fn try_terminal(&self, fragment: Fragment) -> bool {
        self.tx.send(fragment).await.is_ok()
    }

    /// Resolves when the receiver has been dropped.
    async fn closed(&self) {
        self.tx.closed().await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Tool provider session lifecycle.
//!
//! A session owns one provider child process: spawn, handshake, tool
//! discovery, invocation, and teardown. Sessions are opened per turn and
//! must be closed exactly once — `close()` terminates the process or it
//! leaks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::errors::ProviderError;
use super::transport::{self, StdioTransport};
use super::types::{
    InitializeResult, ListToolsResult, ProviderConfig, ToolDescriptor, ToolOutcome,
};
use crate::inference::types::ToolCall;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ToolSession trait ───────────────────────────────────────────────────────

/// The orchestrator-facing session contract.
///
/// Abstracts the live subprocess so the agent loop (and its tests) depend
/// only on `descriptors`/`invoke`/`close`. `Sync` because the registry is
/// shared by reference across await points in the spawned turn task.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools discovered at session open, in provider listing order.
    fn descriptors(&self) -> &[ToolDescriptor];

    /// Invoke a tool and extract its textual outcome.
    async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ProviderError>;

    /// Release the session and its underlying process.
    async fn close(self: Box<Self>) -> Result<(), ProviderError>;
}

// ─── ProviderSession ─────────────────────────────────────────────────────────

/// A live connection to a spawned tool provider process.
pub struct ProviderSession {
    process: Child,
    transport: StdioTransport,
    tools: Vec<ToolDescriptor>,
    call_timeout: Duration,
}

impl ProviderSession {
    /// Spawn the provider process and perform the discovery handshake.
    ///
    /// Sends `initialize` followed by `tools/list`, both under the
    /// configured init timeout. On handshake failure the child's stderr is
    /// captured for diagnostics and the process is killed.
    pub async fn open(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ProviderError::Unavailable {
            reason: format!("failed to spawn '{}': {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or(ProviderError::Unavailable {
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or(ProviderError::Unavailable {
            reason: "failed to capture stdout".into(),
        })?;
        let stderr_handle = child.stderr.take();

        let transport = StdioTransport::new(stdin, stdout);

        let init_timeout = Duration::from_millis(config.init_timeout_ms);
        let tools = match tokio::time::timeout(init_timeout, handshake(&transport)).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
                if !stderr_ctx.is_empty() {
                    tracing::warn!(stderr = %stderr_ctx, "provider stderr captured on failure");
                }
                let _ = child.kill().await;
                return Err(ProviderError::Unavailable {
                    reason: format!("handshake failed: {e}{}", stderr_suffix(&stderr_ctx)),
                });
            }
            Err(_) => {
                let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
                if !stderr_ctx.is_empty() {
                    tracing::warn!(stderr = %stderr_ctx, "provider stderr captured on timeout");
                }
                let _ = child.kill().await;
                return Err(ProviderError::Timeout {
                    operation: "initialize".into(),
                    timeout_ms: config.init_timeout_ms,
                });
            }
        };

        tracing::info!(
            command = %config.command,
            tool_count = tools.len(),
            "tool provider session opened"
        );

        Ok(Self {
            process: child,
            transport,
            tools,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        })
    }
}

#[async_trait]
impl ToolSession for ProviderSession {
    fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Send `tools/call` under the call timeout.
    ///
    /// A JSON-RPC error response is folded into `ToolOutcome` with
    /// `is_error: true` — the tool ran (or was rejected) and the model can
    /// adapt. Transport failures and timeouts surface as `ProviderError`.
    async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ProviderError> {
        let params = serde_json::json!({
            "name": call.name,
            "arguments": call.arguments,
        });

        let response = tokio::time::timeout(
            self.call_timeout,
            self.transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            operation: format!("tools/call '{}'", call.name),
            timeout_ms: self.call_timeout.as_millis() as u64,
        })??;

        match transport::extract_result(response) {
            Ok(result) => Ok(parse_call_result(&result)),
            Err(ProviderError::Rpc { code, message, .. }) => Ok(ToolOutcome {
                text: format!("[{code}] {message}"),
                is_error: true,
            }),
            Err(e) => Err(e),
        }
    }

    /// Graceful teardown: best-effort `shutdown` notification, bounded wait,
    /// then kill.
    async fn close(self: Box<Self>) -> Result<(), ProviderError> {
        let mut this = *self;
        let _ = this.transport.notify("shutdown", None).await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, this.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(code = ?status.code(), "tool provider exited");
            }
            _ => {
                let _ = this.process.kill().await;
                tracing::debug!("tool provider killed after shutdown timeout");
            }
        }
        Ok(())
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// `initialize` then `tools/list`, returning the ordered descriptors.
async fn handshake(transport: &StdioTransport) -> Result<Vec<ToolDescriptor>, ProviderError> {
    let response = transport.request("initialize", None).await?;
    let result = transport::extract_result(response)?;

    let _init: InitializeResult =
        serde_json::from_value(result).map_err(|e| ProviderError::Protocol {
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    let response = transport.request("tools/list", None).await?;
    let result = transport::extract_result(response)?;

    let listing: ListToolsResult =
        serde_json::from_value(result).map_err(|e| ProviderError::Protocol {
            reason: format!("failed to parse tools/list response: {e}"),
        })?;

    Ok(listing.tools)
}

/// Extract the textual payload from a `tools/call` result.
///
/// Providers return `{content: [{type: "text", text: …}, …], isError}`.
/// Text items are concatenated; a result with no text content falls back
/// to its JSON form so the model always sees something.
fn parse_call_result(result: &serde_json::Value) -> ToolOutcome {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let text = match result.get("content").and_then(|c| c.as_array()) {
        Some(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect();
            if parts.is_empty() {
                result.to_string()
            } else {
                parts.join("\n")
            }
        }
        None => result.to_string(),
    };

    ToolOutcome { text, is_error }
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// Read any available stderr output from a failed provider process.
///
/// Short timeout so an empty or still-open stderr does not block startup
/// error reporting. Truncated to keep log messages readable.
async fn read_stderr_on_failure(stderr_handle: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(Duration::from_millis(500), stderr.read_to_string(&mut buf)).await {
        Ok(Ok(_)) => {
            if buf.len() > 2000 {
                buf.truncate(2000);
                buf.push_str("...(truncated)");
            }
            buf
        }
        _ => String::new(),
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Tool provider error types.

use thiserror::Error;

/// Errors that can occur while talking to the tool provider process.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider process failed to start or connect.
    #[error("tool provider unavailable: {reason}")]
    Unavailable {
        reason: String,
    },

    /// Malformed tool listing or tool-call payload.
    #[error("provider protocol error: {reason}")]
    Protocol {
        reason: String,
    },

    /// JSON-RPC communication error (I/O failure, closed pipe).
    #[error("provider disconnected: {reason}")]
    Disconnected {
        reason: String,
    },

    /// Provider returned a JSON-RPC error response.
    #[error("provider error [{code}]: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not present in the registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// A provider request timed out.
    #[error("provider request '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },
}

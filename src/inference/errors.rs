//! Inference client error types.

use thiserror::Error;

/// Errors from the model endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Could not reach the endpoint.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The request timed out.
    #[error("inference request timed out after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// The endpoint returned a non-success HTTP status.
    #[error("inference endpoint returned HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The SSE stream produced malformed data.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// The model emitted a tool call with unparseable arguments.
    #[error("failed to parse tool call arguments: {reason}")]
    ToolCallParseError {
        raw_arguments: String,
        reason: String,
    },
}

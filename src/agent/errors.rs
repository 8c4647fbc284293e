//! Turn-level error classification.
//!
//! Everything that can abort a turn maps to one of these kinds before it
//! reaches a transport — a raw provider or inference error never crosses
//! the orchestrator boundary unclassified. Recoverable conditions
//! (unknown tool, tool execution failure) are folded into the transcript
//! as synthesized tool results instead and never appear here.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::provider::ProviderError;

/// Fatal turn failures.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The tool provider process failed to start or connect.
    #[error("tool provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// Malformed tool listing or tool-call payload.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// The bounded tool-iteration guard tripped.
    #[error("tool loop exceeded after {rounds} rounds")]
    ToolLoopExceeded { rounds: usize },

    /// The caller went away mid-turn. Never delivered (there is no one
    /// to deliver it to) but still drives session release.
    #[error("caller disconnected")]
    Disconnected,

    /// The model endpoint failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl TurnError {
    /// Stable classification string carried by the terminal Error fragment.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::Protocol { .. } => "protocol_error",
            Self::ToolLoopExceeded { .. } => "tool_loop_exceeded",
            Self::Disconnected => "transport_disconnected",
            Self::Inference(_) => "inference_error",
        }
    }

    /// Classify a provider error that escaped the recoverable paths.
    pub fn from_provider(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable { reason } => Self::ProviderUnavailable { reason },
            // A timed-out or disconnected provider is gone for the rest of
            // the turn, so it classifies the same as a failed start.
            ProviderError::Timeout { .. } | ProviderError::Disconnected { .. } => {
                Self::ProviderUnavailable {
                    reason: err.to_string(),
                }
            }
            other => Self::Protocol {
                reason: other.to_string(),
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(
            TurnError::ToolLoopExceeded { rounds: 8 }.kind(),
            "tool_loop_exceeded"
        );
        assert_eq!(TurnError::Disconnected.kind(), "transport_disconnected");
        assert_eq!(
            TurnError::ProviderUnavailable {
                reason: "spawn failed".into()
            }
            .kind(),
            "provider_unavailable"
        );
    }

    #[test]
    fn test_from_provider_classification() {
        let err = TurnError::from_provider(ProviderError::Unavailable {
            reason: "no such binary".into(),
        });
        assert!(matches!(err, TurnError::ProviderUnavailable { .. }));

        let err = TurnError::from_provider(ProviderError::Timeout {
            operation: "tools/call".into(),
            timeout_ms: 1000,
        });
        assert_eq!(err.kind(), "provider_unavailable");

        let err = TurnError::from_provider(ProviderError::Protocol {
            reason: "bad listing".into(),
        });
        assert_eq!(err.kind(), "protocol_error");
    }
}

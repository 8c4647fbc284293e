//! The fragment stream — the orchestrator's output unit.

use serde::Serialize;

/// Smallest unit of streamed turn output.
///
/// Fragments are produced in strict emission order and must not be
/// reordered by a transport. A `ToolResult` for a call never precedes
/// the `ToolCallRequested` that announced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    /// An incremental text delta, forwarded as soon as it arrives.
    Text { delta: String },

    /// The model requested a tool invocation.
    ToolCallRequested {
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },

    /// A tool invocation finished (successfully or not).
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },

    /// The turn completed. Carries the assembled assistant message —
    /// the concatenation of every `Text` delta in emission order — so
    /// the transport can fold it back into conversation history.
    Done { message: String },

    /// The turn failed. Exactly one terminal `Error` fragment is emitted
    /// per failed turn; history stays unchanged so the caller can retry.
    Error {
        /// Stable classification string. Serialized as `error_kind`
        /// because the enum tag already claims `kind`.
        #[serde(rename = "error_kind")]
        kind: String,
        message: String,
    },
}

impl Fragment {
    /// Whether this fragment terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Fragment::Done { .. } | Fragment::Error { .. })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_fragments() {
        assert!(Fragment::Done {
            message: "hi".into()
        }
        .is_terminal());
        assert!(Fragment::Error {
            kind: "tool_loop_exceeded".into(),
            message: "x".into()
        }
        .is_terminal());
        assert!(!Fragment::Text {
            delta: "hi".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_fragment_serialization_is_tagged() {
        let frag = Fragment::Text {
            delta: "hello".into(),
        };
        let json = serde_json::to_string(&frag).unwrap();
        assert!(json.contains("\"kind\":\"text\""));
        assert!(json.contains("\"delta\":\"hello\""));
    }

    #[test]
    fn test_error_fragment_classification_does_not_shadow_tag() {
        let frag = Fragment::Error {
            kind: "tool_loop_exceeded".into(),
            message: "tool loop exceeded after 8 rounds".into(),
        };
        let json = serde_json::to_string(&frag).unwrap();
        assert!(json.contains("\"kind\":\"error\""));
        assert!(json.contains("\"error_kind\":\"tool_loop_exceeded\""));
    }
}

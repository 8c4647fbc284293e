//! Function registry — the name → descriptor mapping for one session.
//!
//! Rebuilt from scratch for every provider session (never mutated
//! incrementally) so the registry can only describe tools the live
//! session actually exposes. All tool execution flows through
//! [`FunctionRegistry::invoke`]; the orchestrator never touches the
//! session directly.

use std::collections::HashMap;

use super::errors::ProviderError;
use super::session::ToolSession;
use super::types::ToolDescriptor;
use crate::inference::types::{FunctionDefinition, ToolCall, ToolDefinition};

// ─── Registration ────────────────────────────────────────────────────────────

/// A registration that could not be completed.
///
/// Hands the session back so the caller can close it — the registry is
/// never left partially populated.
pub struct RegistrationFailure {
    pub session: Box<dyn ToolSession>,
    pub error: ProviderError,
}

/// Per-session tool registry owning the provider session.
pub struct FunctionRegistry {
    tools: HashMap<String, ToolDescriptor>,
    /// Descriptor names in provider listing order (schema export order).
    order: Vec<String>,
    session: Box<dyn ToolSession>,
}

impl FunctionRegistry {
    /// Build a registry from the session's discovered tools.
    ///
    /// Transactional: an empty or duplicate tool name fails the whole
    /// registration and no registry is constructed.
    pub fn register(session: Box<dyn ToolSession>) -> Result<Self, RegistrationFailure> {
        let mut tools = HashMap::new();
        let mut order = Vec::new();

        // Owned snapshot so the failure arms can hand the session back.
        let descriptors = session.descriptors().to_vec();
        for descriptor in descriptors {
            if descriptor.name.is_empty() {
                return Err(RegistrationFailure {
                    session,
                    error: ProviderError::Protocol {
                        reason: "tool listing contains an unnamed tool".into(),
                    },
                });
            }
            if tools
                .insert(descriptor.name.clone(), descriptor.clone())
                .is_some()
            {
                return Err(RegistrationFailure {
                    session,
                    error: ProviderError::Protocol {
                        reason: format!("duplicate tool name '{}' in listing", descriptor.name),
                    },
                });
            }
            order.push(descriptor.name.clone());
        }

        tracing::debug!(tool_count = order.len(), "function registry built");

        Ok(Self {
            tools,
            order,
            session,
        })
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry holds no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a descriptor by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, ProviderError> {
        self.tools.get(name).ok_or(ProviderError::UnknownTool {
            name: name.to_string(),
        })
    }

    /// Registered tool names in listing order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Serialize the registry as OpenAI function-tool definitions, in
    /// provider listing order.
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|def| ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: if def.input_schema.is_null() {
                        serde_json::json!({"type": "object", "properties": {}})
                    } else {
                        def.input_schema.clone()
                    },
                },
            })
            .collect()
    }

    /// Release the owned provider session.
    pub async fn close(self) -> Result<(), ProviderError> {
        self.session.close().await
    }

    // ─── Execution ───────────────────────────────────────────────────────

    /// Execute a tool call requested by the model.
    ///
    /// The sole execution path: resolves the name, validates required
    /// schema fields, dispatches to the session, and classifies the result
    /// as recoverable or fatal for the turn.
    pub async fn invoke(&self, call: &ToolCall) -> InvokeOutcome {
        let descriptor = match self.resolve(&call.name) {
            Ok(d) => d,
            Err(_) => {
                tracing::warn!(tool = %call.name, "model requested unregistered tool");
                return InvokeOutcome::UnknownTool {
                    name: call.name.clone(),
                };
            }
        };

        if let Err(reason) = validate_arguments(descriptor, &call.arguments) {
            tracing::warn!(tool = %call.name, %reason, "tool call failed argument validation");
            return InvokeOutcome::ToolError {
                text: format!("Invalid arguments for '{}': {reason}", call.name),
            };
        }

        match self.session.invoke(call).await {
            Ok(outcome) if outcome.is_error => InvokeOutcome::ToolError { text: outcome.text },
            Ok(outcome) => InvokeOutcome::Success { text: outcome.text },
            Err(e) => InvokeOutcome::Fatal(e),
        }
    }
}

/// Check required fields from the descriptor's input schema.
fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: &serde_json::Value,
) -> Result<(), String> {
    let Some(required) = descriptor
        .input_schema
        .get("required")
        .and_then(|r| r.as_array())
    else {
        return Ok(());
    };

    let args_obj = arguments.as_object();
    for field in required {
        if let Some(field_name) = field.as_str() {
            let has_field = args_obj
                .map(|obj| obj.contains_key(field_name))
                .unwrap_or(false);
            if !has_field {
                return Err(format!("missing required field '{field_name}'"));
            }
        }
    }

    Ok(())
}

// ─── Invocation Outcome ──────────────────────────────────────────────────────

/// Classified result of a tool invocation.
#[derive(Debug)]
pub enum InvokeOutcome {
    /// The tool ran and produced output.
    Success { text: String },
    /// The tool ran but failed, or the call was rejected — recoverable:
    /// the text is fed back to the model as the tool result.
    ToolError { text: String },
    /// The model named a tool absent from the registry — recoverable.
    UnknownTool { name: String },
    /// Provider-level failure (timeout, disconnect) — fatal for the turn.
    Fatal(ProviderError),
}

impl InvokeOutcome {
    /// The text to fold into the transcript as the tool message.
    ///
    /// Fatal outcomes have no model-facing text; the turn aborts instead.
    pub fn model_text(&self) -> Option<String> {
        match self {
            Self::Success { text } => Some(text.clone()),
            Self::ToolError { text } => Some(format!("Error: {text}")),
            Self::UnknownTool { name } => Some(format!(
                "Error: tool '{name}' is not available. Use only the tools provided."
            )),
            Self::Fatal(_) => None,
        }
    }

    /// Whether this outcome represents a failed invocation.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::ToolOutcome;
    use async_trait::async_trait;

    struct FakeSession {
        tools: Vec<ToolDescriptor>,
    }

    #[async_trait]
    impl ToolSession for FakeSession {
        fn descriptors(&self) -> &[ToolDescriptor] {
            &self.tools
        }

        async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ProviderError> {
            Ok(ToolOutcome {
                text: format!("ran {}", call.name),
                is_error: false,
            })
        }

        async fn close(self: Box<Self>) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn descriptor(name: &str, required: &[&str]) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: serde_json::json!({
                "type": "object",
                "required": required,
            }),
        }
    }

    fn registry_with(tools: Vec<ToolDescriptor>) -> FunctionRegistry {
        FunctionRegistry::register(Box::new(FakeSession { tools }))
            .unwrap_or_else(|_| panic!("registration should succeed"))
    }

    #[test]
    fn test_register_preserves_listing_order() {
        let registry = registry_with(vec![
            descriptor("zeta", &[]),
            descriptor("alpha", &[]),
            descriptor("mid", &[]),
        ]);
        assert_eq!(registry.names(), &["zeta", "alpha", "mid"]);

        let schemas = registry.schemas();
        assert_eq!(schemas[0].function.name, "zeta");
        assert_eq!(schemas[2].function.name, "mid");
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let result = FunctionRegistry::register(Box::new(FakeSession {
            tools: vec![descriptor("a", &[]), descriptor("a", &[])],
        }));
        let failure = match result {
            Err(f) => f,
            Ok(_) => panic!("duplicate names must fail registration"),
        };
        assert!(matches!(failure.error, ProviderError::Protocol { .. }));
    }

    #[test]
    fn test_register_rejects_unnamed_tool() {
        let result = FunctionRegistry::register(Box::new(FakeSession {
            tools: vec![ToolDescriptor {
                name: String::new(),
                description: "nameless".into(),
                input_schema: serde_json::Value::Null,
            }],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = registry_with(vec![descriptor("a", &[]), descriptor("b", &[])]);
        let err = registry.resolve("c").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownTool { .. }));
    }

    #[test]
    fn test_schemas_null_input_schema_defaults_to_empty_object() {
        let registry = registry_with(vec![ToolDescriptor {
            name: "bare".into(),
            description: "no schema".into(),
            input_schema: serde_json::Value::Null,
        }]);
        let schemas = registry.schemas();
        assert_eq!(schemas[0].function.parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_recoverable() {
        let registry = registry_with(vec![descriptor("a", &[])]);
        let call = ToolCall {
            id: "call_1".into(),
            name: "c".into(),
            arguments: serde_json::json!({}),
        };
        let outcome = registry.invoke(&call).await;
        assert!(matches!(outcome, InvokeOutcome::UnknownTool { .. }));
        assert!(outcome.model_text().unwrap().contains("not available"));
    }

    #[tokio::test]
    async fn test_invoke_validates_required_fields() {
        let registry = registry_with(vec![descriptor("get_weather", &["location"])]);
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: serde_json::json!({}),
        };
        let outcome = registry.invoke(&call).await;
        match outcome {
            InvokeOutcome::ToolError { ref text } => {
                assert!(text.contains("location"));
            }
            other => panic!("expected ToolError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let registry = registry_with(vec![descriptor("get_weather", &["location"])]);
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: serde_json::json!({"location": "Paris"}),
        };
        let outcome = registry.invoke(&call).await;
        assert!(!outcome.is_error());
        assert_eq!(outcome.model_text().unwrap(), "ran get_weather");
    }
}

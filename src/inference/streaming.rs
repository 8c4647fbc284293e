//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads a `reqwest::Response` as a byte stream, splits on SSE event
//! boundaries (`data: …\n\n`), parses each event as JSON, and accumulates
//! tool-call deltas across events until the model finishes.

use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ChatCompletionChunk, StreamChunk, ToolCall};

// ─── SSE parser ──────────────────────────────────────────────────────────────

/// Parse raw SSE bytes into `StreamChunk`s.
///
/// The main entry point for streaming:
/// 1. splits the HTTP body into SSE events,
/// 2. parses each `data:` payload as a `ChatCompletionChunk`,
/// 3. accumulates tool-call fragments across deltas,
/// 4. emits a `StreamChunk` per event.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<StreamChunk, InferenceError>> {
    let byte_stream = response.bytes_stream();
    let state = StreamState::new();

    stream::unfold(
        (byte_stream, state, String::new()),
        |(mut byte_stream, mut state, mut buffer)| async move {
            loop {
                // Complete SSE event in the buffer?
                if let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer = buffer[event_end + 2..].to_string();

                    match state.process_event(&event) {
                        Ok(Some(chunk)) => return Some((Ok(chunk), (byte_stream, state, buffer))),
                        Ok(None) => continue, // keep-alive or empty delta
                        Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                    }
                }

                // Need more data from the stream
                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, state, buffer),
                        ));
                    }
                    None => {
                        // Stream ended — flush any trailing event
                        if !buffer.trim().is_empty() {
                            let event = buffer.trim().to_string();
                            buffer.clear();
                            match state.process_event(&event) {
                                Ok(Some(chunk)) => {
                                    return Some((Ok(chunk), (byte_stream, state, buffer)))
                                }
                                Ok(None) => return None,
                                Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

// ─── Stream State ────────────────────────────────────────────────────────────

/// Accumulates tool-call fragments across SSE events.
///
/// In-progress calls are keyed by delta index as
/// `(index, id, name, arguments_buffer)` and finalized when the model
/// reports `finish_reason: "tool_calls"` or the stream ends with `[DONE]`.
pub(crate) struct StreamState {
    pending_tool_calls: Vec<(u32, Option<String>, String, String)>,
}

impl StreamState {
    pub(crate) fn new() -> Self {
        Self {
            pending_tool_calls: Vec::new(),
        }
    }

    /// Process a single SSE event string (may contain multiple `data:` lines).
    pub(crate) fn process_event(
        &mut self,
        event: &str,
    ) -> Result<Option<StreamChunk>, InferenceError> {
        let mut data_content = String::new();

        for line in event.lines() {
            if let Some(data) = line
                .strip_prefix("data: ")
                .or_else(|| line.strip_prefix("data:"))
            {
                let data = data.trim();
                if data == "[DONE]" {
                    return self.finalize();
                }
                data_content.push_str(data);
            }
            // Non-data lines (comments, event types) are ignored.
        }

        if data_content.is_empty() {
            return Ok(None);
        }

        let chunk: ChatCompletionChunk =
            serde_json::from_str(&data_content).map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse SSE chunk: {e} (data: {data_content})"),
            })?;

        self.process_chunk(chunk)
    }

    /// Process a parsed `ChatCompletionChunk`.
    fn process_chunk(
        &mut self,
        chunk: ChatCompletionChunk,
    ) -> Result<Option<StreamChunk>, InferenceError> {
        let choice = match chunk.choices.first() {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut result = StreamChunk {
            token: None,
            tool_calls: None,
            finish_reason: choice.finish_reason.clone(),
        };

        if let Some(ref content) = choice.delta.content {
            if !content.is_empty() {
                result.token = Some(content.clone());
            }
        }

        if let Some(ref tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                let index = tc.index.unwrap_or(0);

                let pending = self
                    .pending_tool_calls
                    .iter_mut()
                    .find(|(idx, _, _, _)| *idx == index);

                match pending {
                    Some((_, ref mut id, ref mut name, ref mut args)) => {
                        if let Some(ref f) = tc.function {
                            if let Some(ref n) = f.name {
                                name.push_str(n);
                            }
                            if let Some(ref a) = f.arguments {
                                args.push_str(a);
                            }
                        }
                        if tc.id.is_some() {
                            *id = tc.id.clone();
                        }
                    }
                    None => {
                        let name = tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();
                        let args = tc
                            .function
                            .as_ref()
                            .and_then(|f| f.arguments.clone())
                            .unwrap_or_default();
                        self.pending_tool_calls
                            .push((index, tc.id.clone(), name, args));
                    }
                }
            }
        }

        if result.finish_reason.as_deref() == Some("tool_calls") {
            result.tool_calls = Some(self.finalize_tool_calls()?);
        }

        Ok(Some(result))
    }

    /// Finalize accumulated tool calls, parsing the buffered argument JSON.
    fn finalize_tool_calls(&mut self) -> Result<Vec<ToolCall>, InferenceError> {
        let pending = std::mem::take(&mut self.pending_tool_calls);
        let mut calls = Vec::with_capacity(pending.len());

        for (_index, id, name, args) in pending {
            let arguments: serde_json::Value = if args.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&args).map_err(|e| InferenceError::ToolCallParseError {
                    raw_arguments: args.clone(),
                    reason: format!("invalid JSON: {e}"),
                })?
            };

            calls.push(ToolCall {
                id: id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
                name,
                arguments,
            });
        }

        Ok(calls)
    }

    /// End-of-stream: emit any tool calls the model never flagged with a
    /// `tool_calls` finish reason.
    fn finalize(&mut self) -> Result<Option<StreamChunk>, InferenceError> {
        if self.pending_tool_calls.is_empty() {
            return Ok(None);
        }
        let calls = self.finalize_tool_calls()?;
        Ok(Some(StreamChunk {
            token: None,
            tool_calls: Some(calls),
            finish_reason: Some("tool_calls".into()),
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text_event(content: &str) -> String {
        format!(
            r#"data: {{"id":"c1","choices":[{{"delta":{{"content":{}}},"finish_reason":null}}]}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn test_text_delta() {
        let mut state = StreamState::new();
        let chunk = state.process_event(&text_event("Hello")).unwrap().unwrap();
        assert_eq!(chunk.token.as_deref(), Some("Hello"));
        assert!(chunk.tool_calls.is_none());
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn test_done_marker_without_tool_calls_yields_nothing() {
        let mut state = StreamState::new();
        let result = state.process_event("data: [DONE]").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_keep_alive_comment_ignored() {
        let mut state = StreamState::new();
        let result = state.process_event(": keep-alive").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_tool_call_accumulated_across_deltas() {
        let mut state = StreamState::new();

        let open = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#;
        let args1 = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"location\":"}}]},"finish_reason":null}]}"#;
        let args2 = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]},"finish_reason":null}]}"#;
        let finish = r#"data: {"id":"c1","choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;

        assert!(state.process_event(open).unwrap().unwrap().tool_calls.is_none());
        state.process_event(args1).unwrap();
        state.process_event(args2).unwrap();

        let chunk = state.process_event(finish).unwrap().unwrap();
        let calls = chunk.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments["location"], "Paris");
    }

    #[test]
    fn test_tool_call_finalized_on_done_marker() {
        let mut state = StreamState::new();
        let open = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"get_weather","arguments":"{}"}}]},"finish_reason":null}]}"#;
        state.process_event(open).unwrap();

        let chunk = state.process_event("data: [DONE]").unwrap().unwrap();
        let calls = chunk.tool_calls.unwrap();
        assert_eq!(calls[0].name, "get_weather");
        // No ID supplied by the model — one is synthesized.
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(chunk.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_parallel_tool_calls_keyed_by_index() {
        let mut state = StreamState::new();
        let event = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"first","arguments":"{}"}},{"index":1,"id":"b","function":{"name":"second","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#;
        let chunk = state.process_event(event).unwrap().unwrap();
        let calls = chunk.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn test_malformed_arguments_surface_parse_error() {
        let mut state = StreamState::new();
        let open = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"get_weather","arguments":"{not json"}}]},"finish_reason":"tool_calls"}]}"#;
        let err = state.process_event(open).unwrap_err();
        assert!(matches!(err, InferenceError::ToolCallParseError { .. }));
    }

    #[test]
    fn test_empty_arguments_default_to_empty_object() {
        let mut state = StreamState::new();
        let open = r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"x","function":{"name":"list_all","arguments":""}}]},"finish_reason":"tool_calls"}]}"#;
        let chunk = state.process_event(open).unwrap().unwrap();
        let calls = chunk.tool_calls.unwrap();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_malformed_json_chunk_is_stream_error() {
        let mut state = StreamState::new();
        let err = state.process_event("data: {broken").unwrap_err();
        assert!(matches!(err, InferenceError::StreamError { .. }));
    }
}

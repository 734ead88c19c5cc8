//! Ollama response parsing
//!
//! Each line of an `/api/chat` stream is one JSON record. Records are decoded
//! tolerantly into [`StreamDelta`]s: unknown fields are dropped, and a line
//! that is not JSON at all is skipped by the caller.

use agentloom_core::Usage;
use serde_json::{Map, Value as JsonValue};

/// A tool call proposed by the model, before it has an identity
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedToolCall {
    pub name: String,
    pub arguments: Map<String, JsonValue>,
}

/// One decoded piece of a stream record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// Proposed tool calls
    ToolCalls(Vec<RequestedToolCall>),
    /// Native reasoning delta
    Thinking(String),
    /// Visible content delta (may contain `<think>` markup)
    Content(String),
    /// Final record of the response
    Done(Option<Usage>),
    /// The endpoint reported an error inside the stream
    Failed(String),
}

/// Decode one NDJSON line
///
/// Returns `None` when the line is not a JSON object. Deltas come out in the
/// order tool calls, thinking, content, done.
pub fn decode_record(line: &str) -> Option<Vec<StreamDelta>> {
    let json: JsonValue = serde_json::from_str(line.trim()).ok()?;
    let record = json.as_object()?;

    let mut deltas = Vec::new();

    if let Some(error) = record.get("error").and_then(|e| e.as_str()) {
        deltas.push(StreamDelta::Failed(error.to_string()));
        return Some(deltas);
    }

    if let Some(message) = record.get("message").and_then(|m| m.as_object()) {
        let calls: Vec<RequestedToolCall> = message
            .get("tool_calls")
            .and_then(|c| c.as_array())
            .map(|calls| calls.iter().filter_map(decode_tool_call).collect())
            .unwrap_or_default();
        if !calls.is_empty() {
            deltas.push(StreamDelta::ToolCalls(calls));
        }

        if let Some(thinking) = message.get("thinking").and_then(|t| t.as_str()) {
            if !thinking.is_empty() {
                deltas.push(StreamDelta::Thinking(thinking.to_string()));
            }
        }

        if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                deltas.push(StreamDelta::Content(content.to_string()));
            }
        }
    }

    if record.get("done").and_then(|d| d.as_bool()) == Some(true) {
        deltas.push(StreamDelta::Done(decode_usage(record)));
    }

    Some(deltas)
}

fn decode_tool_call(raw: &JsonValue) -> Option<RequestedToolCall> {
    let function = raw.get("function")?;
    let name = function.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    // Some models send arguments as a JSON-encoded string
    let arguments = match function.get("arguments") {
        Some(JsonValue::Object(map)) => map.clone(),
        Some(JsonValue::String(text)) => serde_json::from_str::<Map<String, JsonValue>>(text)
            .unwrap_or_default(),
        _ => Map::new(),
    };

    Some(RequestedToolCall {
        name: name.to_string(),
        arguments,
    })
}

fn decode_usage(record: &Map<String, JsonValue>) -> Option<Usage> {
    let prompt = record.get("prompt_eval_count").and_then(|v| v.as_u64());
    let completion = record.get("eval_count").and_then(|v| v.as_u64());
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    Some(Usage {
        prompt_tokens: prompt.unwrap_or(0),
        completion_tokens: completion.unwrap_or(0),
    })
}

/// Reassembles network chunks into complete lines
///
/// A record split across chunk boundaries (including a split inside a
/// multi-byte character) is only released once its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed (blank lines dropped)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_record() {
        let deltas =
            decode_record(r#"{"model":"m","message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(deltas, vec![StreamDelta::Content("Hi".into())]);
    }

    #[test]
    fn test_decode_final_record_with_usage() {
        let deltas = decode_record(
            r#"{"message":{"content":""},"done":true,"prompt_eval_count":20,"eval_count":7}"#,
        )
        .unwrap();
        assert_eq!(
            deltas,
            vec![StreamDelta::Done(Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 7
            }))]
        );
    }

    #[test]
    fn test_decode_tool_calls_and_thinking_order() {
        let line = r#"{"message":{"content":"x","thinking":"hmm","tool_calls":[
            {"function":{"name":"search","arguments":{"q":"rust"}}},
            {"function":{"name":"","arguments":{}}},
            {"function":{"name":"fetch","arguments":"{\"url\":\"u\"}"}},
            {"nonsense":true}
        ]},"done":false}"#
            .replace('\n', "");
        let deltas = decode_record(&line).unwrap();
        assert_eq!(deltas.len(), 3);
        match &deltas[0] {
            StreamDelta::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "search");
                assert_eq!(calls[0].arguments["q"], "rust");
                assert_eq!(calls[1].arguments["url"], "u");
            }
            other => panic!("unexpected delta {:?}", other),
        }
        assert_eq!(deltas[1], StreamDelta::Thinking("hmm".into()));
        assert_eq!(deltas[2], StreamDelta::Content("x".into()));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode_record("not json").is_none());
        assert!(decode_record("[1,2]").is_none());
        // Unknown shape decodes to nothing rather than failing
        assert_eq!(decode_record(r#"{"status":"loading"}"#), Some(vec![]));
    }

    #[test]
    fn test_decode_error_record() {
        let deltas = decode_record(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(deltas, vec![StreamDelta::Failed("model not found".into())]);
    }

    #[test]
    fn test_line_buffer_reassembles_split_records() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(br#"{"message":{"con"#).is_empty());
        let lines = buf.push(b"tent\":\"a\"}}\n{\"done\"");
        assert_eq!(lines, vec![r#"{"message":{"content":"a"}}"#.to_string()]);
        assert!(buf.push(b":true}").is_empty());
        assert_eq!(buf.finish().as_deref(), Some(r#"{"done":true}"#));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_line_buffer_split_multibyte_char() {
        let bytes = "é\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..1]).is_empty());
        assert_eq!(buf.push(&bytes[1..]), vec!["é".to_string()]);
    }
}

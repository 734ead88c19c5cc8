//! Conversion of conversation state to the Ollama `/api/chat` wire format

use agentloom_core::{Message, Role, Tool};
use serde_json::{json, Value as JsonValue};

/// Build the streaming request body
pub fn build_chat_body(
    model: &str,
    messages: &[Message],
    system_prompt: Option<&str>,
    tools: &[Tool],
    context_size: u32,
) -> JsonValue {
    let mut body = json!({
        "model": model,
        "messages": messages_to_wire(messages, system_prompt),
        "stream": true,
        "options": { "num_ctx": context_size },
    });
    if !tools.is_empty() {
        body["tools"] = JsonValue::Array(tools_to_wire(tools));
    }
    body
}

/// Tool definitions in function-calling form
pub fn tools_to_wire(tools: &[Tool]) -> Vec<JsonValue> {
    tools
        .iter()
        .map(|tool| {
            let parameters = match &tool.input_schema {
                JsonValue::Null => json!({"type": "object", "properties": {}}),
                schema => schema.clone(),
            };
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                }
            })
        })
        .collect()
}

/// Role-tagged message array
///
/// Streaming placeholders and display-only roles are skipped. Each finished
/// tool call on a tool message becomes its own `tool` entry.
pub fn messages_to_wire(messages: &[Message], system_prompt: Option<&str>) -> Vec<JsonValue> {
    let mut out = Vec::with_capacity(messages.len() + 1);

    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        out.push(json!({"role": "system", "content": prompt}));
    }

    for msg in messages {
        if msg.is_streaming || !msg.role.is_conversational() {
            continue;
        }
        match msg.role {
            Role::System => out.push(json!({"role": "system", "content": msg.content})),
            Role::User => {
                let mut entry = json!({"role": "user", "content": msg.content});
                let images: Vec<&str> = msg
                    .attachments
                    .iter()
                    .filter(|a| a.is_image())
                    .map(|a| a.payload())
                    .collect();
                if !images.is_empty() {
                    entry["images"] = json!(images);
                }
                out.push(entry);
            }
            Role::Assistant => {
                let mut entry = json!({"role": "assistant", "content": msg.content});
                if !msg.tool_calls.is_empty() {
                    entry["tool_calls"] = msg
                        .tool_calls
                        .iter()
                        .map(|tc| json!({"function": {"name": tc.name, "arguments": tc.args}}))
                        .collect();
                }
                out.push(entry);
            }
            Role::Tool => {
                for tc in &msg.tool_calls {
                    out.push(json!({
                        "role": "tool",
                        "content": tc.result_text(),
                        "tool_call_id": tc.id,
                        "tool_name": tc.name,
                    }));
                }
            }
            Role::Plan | Role::Agent => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::{Attachment, ToolCall};
    use serde_json::Map;

    #[test]
    fn test_system_prompt_first_and_streaming_skipped() {
        let mut streaming = Message::assistant("partial");
        streaming.is_streaming = true;
        let plan = Message::new(Role::Plan, "plan bubble");

        let wire = messages_to_wire(
            &[Message::user("hi"), streaming, plan],
            Some("be brief"),
        );
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn test_user_images_only() {
        let msg = Message::user("look").with_attachments(vec![
            Attachment::new("a.png", "image/png", "data:image/png;base64,AAAA"),
            Attachment::new("b.pdf", "application/pdf", "BBBB"),
        ]);
        let wire = messages_to_wire(&[msg], None);
        assert_eq!(wire[0]["images"], json!(["AAAA"]));
    }

    #[test]
    fn test_tool_results_expand_per_call() {
        let mut ok = ToolCall::pending("search", Map::new());
        ok.succeed(json!({"hits": 2}));
        let mut bad = ToolCall::pending("fetch", Map::new());
        bad.fail("timeout");

        let wire = messages_to_wire(&[Message::tool_results(vec![ok.clone(), bad])], None);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["content"], r#"{"hits":2}"#);
        assert_eq!(wire[0]["tool_call_id"], json!(ok.id));
        assert_eq!(wire[1]["content"], "timeout");
    }

    #[test]
    fn test_body_omits_empty_tools() {
        let body = build_chat_body("llama3", &[Message::user("hi")], None, &[], 4096);
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_ctx"], 4096);

        let tool = Tool::new("search", "Search", JsonValue::Null);
        let body = build_chat_body("llama3", &[], None, &[tool], 4096);
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
    }
}

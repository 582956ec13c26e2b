use crate::{ContentPart, ImageDetail, InterceptionKey, Message, MetadataSeed, Surface, ToolCall};
use serde_json::json;

/// Panel key for conversation `conv-1`.
pub fn key() -> InterceptionKey {
    InterceptionKey::new("conv-1", Surface::Panel)
}

/// Seed with a fixed request id and model.
pub fn seed(request_id: &str) -> MetadataSeed {
    MetadataSeed {
        request_id: request_id.to_string(),
        model: "gpt-4o".to_string(),
        model_family: Some("gpt-4o".to_string()),
        token_count: Some(1_200),
        max_prompt_tokens: Some(128_000),
        ..Default::default()
    }
}

/// System, mixed-content user turn, assistant tool call, tool result, user follow-up.
pub fn conversation() -> Vec<Message> {
    vec![
        Message::system("You are a careful coding assistant."),
        Message::user("Explain this screenshot.")
            .with_part(ContentPart::image(
                "https://example.com/screen.png",
                Some(ImageDetail::High),
            ))
            .with_part(ContentPart::opaque(json!({"attachment": "ctx-7"}))),
        Message::assistant("Reading the file first.").with_tool_calls(vec![ToolCall::new(
            "call_1",
            "read_file",
            r#"{"path":"src/main.rs"}"#,
        )]),
        Message::tool("call_1", "fn main() {}"),
        Message::user("Now refactor it."),
    ]
}

/// `n` alternating user/assistant messages after a system prompt.
pub fn turn(n: usize) -> Vec<Message> {
    let mut messages = vec![Message::system("You are a careful coding assistant.")];
    for i in 1..n {
        if i % 2 == 1 {
            messages.push(Message::user(format!("question {i}")));
        } else {
            messages.push(Message::assistant(format!("answer {i}")));
        }
    }
    messages
}

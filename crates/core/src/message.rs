use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::Tool => "Tool",
        }
    }
}

/// One chat message as handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Ordered content parts
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Only meaningful on assistant messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Only meaningful on tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, vec![ContentPart::text(text)])
        }
    }

    /// Minimal message for a role with no backing original.
    pub fn shell(role: Role) -> Self {
        let mut message = Self::new(role, Vec::new());
        if role == Role::Tool {
            message.tool_call_id = Some(String::new());
        }
        message
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.content.push(part);
        self
    }

    /// Text parts joined by newlines, as shown on the editing surface.
    pub fn display_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments, kept verbatim
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Typed segment of message content. The set of variants is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<ImageDetail>,
    },
    Opaque {
        value: serde_json::Value,
    },
    CacheBreakpoint {},
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, detail: Option<ImageDetail>) -> Self {
        Self::Image {
            url: url.into(),
            detail,
        }
    }

    pub fn opaque(value: serde_json::Value) -> Self {
        Self::Opaque { value }
    }

    pub fn cache_breakpoint() -> Self {
        Self::CacheBreakpoint {}
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } | Self::Opaque { .. } | Self::CacheBreakpoint {} => None,
        }
    }

    /// Text, or an opaque part carrying a bare string. Aggregate text edits
    /// replace all textual parts and keep everything else.
    pub fn is_textual(&self) -> bool {
        match self {
            Self::Text { .. } => true,
            Self::Opaque { value } => value.is_string(),
            Self::Image { .. } | Self::CacheBreakpoint {} => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Opaque { .. } => "opaque",
            Self::CacheBreakpoint {} => "cache_breakpoint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    Auto,
    Low,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_parts_use_type_tag() {
        let parts = vec![
            ContentPart::text("hello"),
            ContentPart::image("https://example.com/a.png", Some(ImageDetail::High)),
            ContentPart::opaque(json!({"k": 1})),
            ContentPart::cache_breakpoint(),
        ];
        let encoded = serde_json::to_value(&parts).unwrap();
        assert_eq!(encoded[0], json!({"type": "text", "text": "hello"}));
        assert_eq!(
            encoded[1],
            json!({"type": "image", "url": "https://example.com/a.png", "detail": "high"})
        );
        assert_eq!(encoded[2], json!({"type": "opaque", "value": {"k": 1}}));
        assert_eq!(encoded[3], json!({"type": "cache_breakpoint"}));

        let parsed: Vec<ContentPart> = serde_json::from_value(encoded).unwrap();
        assert_eq!(parsed, parts);
    }

    #[test]
    fn unknown_part_type_is_rejected() {
        let err = serde_json::from_value::<ContentPart>(json!({"type": "audio", "url": "x"}));
        assert!(err.is_err());
    }

    #[test]
    fn role_specific_fields_are_omitted_when_empty() {
        let encoded = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!encoded.contains("tool_calls"));
        assert!(!encoded.contains("tool_call_id"));
        assert!(!encoded.contains("name"));

        let tool = serde_json::to_value(Message::tool("call_1", "ok")).unwrap();
        assert_eq!(tool["tool_call_id"], "call_1");
        assert_eq!(tool["role"], "tool");
    }

    #[test]
    fn textual_parts() {
        assert!(ContentPart::text("a").is_textual());
        assert!(ContentPart::opaque(json!("plain")).is_textual());
        assert!(!ContentPart::opaque(json!({"a": 1})).is_textual());
        assert!(!ContentPart::image("u", None).is_textual());
        assert!(!ContentPart::cache_breakpoint().is_textual());
    }

    #[test]
    fn display_text_joins_text_parts_only() {
        let message = Message::user("first")
            .with_part(ContentPart::image("u", None))
            .with_part(ContentPart::text("second"));
        assert_eq!(message.display_text(), "first\nsecond");
    }

    #[test]
    fn tool_shell_carries_empty_call_id() {
        let shell = Message::shell(Role::Tool);
        assert_eq!(shell.tool_call_id.as_deref(), Some(""));
        assert!(shell.content.is_empty());
        assert_eq!(Message::shell(Role::User).tool_call_id, None);
    }
}

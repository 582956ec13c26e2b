use crate::message::{ContentPart, Message, Role};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("message {index}: tool_calls on a {role} message")]
    UnexpectedToolCalls { index: usize, role: &'static str },
    #[error("message {index}: tool message without tool_call_id")]
    MissingToolCallId { index: usize },
    #[error("message {index}: tool_call_id on a {role} message")]
    UnexpectedToolCallId { index: usize, role: &'static str },
    #[error("message {index}: tool call {call_index} has an empty id")]
    EmptyToolCallId { index: usize, call_index: usize },
    #[error("message {index}: image part {part_index} has an empty url")]
    EmptyImageUrl { index: usize, part_index: usize },
    #[error("message {index}: tool result {tool_call_id} has no matching tool call")]
    DanglingToolResult { index: usize, tool_call_id: String },
}

/// Validate a payload by composing independent validators.
pub fn validate_messages(messages: &[Message]) -> Result<(), Vec<ValidationError>> {
    let validators: &[fn(&[Message]) -> Vec<ValidationError>] =
        &[validate_each_message, validate_tool_linkage];

    let errors: Vec<ValidationError> = validators.iter().flat_map(|v| v(messages)).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_each_message(messages: &[Message]) -> Vec<ValidationError> {
    messages
        .iter()
        .enumerate()
        .flat_map(|(index, message)| validate_message(index, message))
        .collect()
}

/// Role-specific field and part checks for a single message.
pub fn validate_message(index: usize, message: &Message) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let role = message.role.as_str();

    if !message.tool_calls.is_empty() && message.role != Role::Assistant {
        errors.push(ValidationError::UnexpectedToolCalls { index, role });
    }
    for (call_index, call) in message.tool_calls.iter().enumerate() {
        if call.id.is_empty() {
            errors.push(ValidationError::EmptyToolCallId { index, call_index });
        }
    }

    match (message.role, message.tool_call_id.as_deref()) {
        (Role::Tool, None) | (Role::Tool, Some("")) => {
            errors.push(ValidationError::MissingToolCallId { index });
        }
        (Role::Tool, Some(_)) | (_, None) => {}
        (_, Some(_)) => errors.push(ValidationError::UnexpectedToolCallId { index, role }),
    }

    for (part_index, part) in message.content.iter().enumerate() {
        if let ContentPart::Image { url, .. } = part {
            if url.is_empty() {
                errors.push(ValidationError::EmptyImageUrl { index, part_index });
            }
        }
    }

    errors
}

fn validate_tool_linkage(messages: &[Message]) -> Vec<ValidationError> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut errors = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        issued.extend(message.tool_calls.iter().map(|call| call.id.as_str()));
        if message.role != Role::Tool {
            continue;
        }
        if let Some(id) = message.tool_call_id.as_deref().filter(|id| !id.is_empty()) {
            if !issued.contains(id) {
                errors.push(ValidationError::DanglingToolResult {
                    index,
                    tool_call_id: id.to_string(),
                });
            }
        }
    }

    errors
}

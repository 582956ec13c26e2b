//! Projects section edits back onto the original messages.
//!
//! Recomposition walks sections in order and emits one message per retained
//! section. Leaf edits replace exactly one part, tool-call argument string or
//! scalar field. The aggregate `edited_content` path rewrites the textual parts
//! of a message as a single text part and keeps every non-textual part in its
//! original relative order.

use crate::message::{ContentPart, Message};
use crate::request::{EditPath, LeafEdit, Section};
use serde::{Deserialize, Serialize};

/// Output of one recomposition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Recomposed {
    pub messages: Vec<Message>,
    pub stale: Vec<StaleEdit>,
}

/// An edit that could not be applied and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleEdit {
    pub section_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<EditPath>,
    pub reason: String,
}

pub fn recompose(original: &[Message], sections: &[Section]) -> Recomposed {
    let mut messages = Vec::with_capacity(sections.len());
    let mut stale = Vec::new();

    for section in sections {
        if section.deleted {
            continue;
        }

        let mut message = base_message(original, section);

        if !section.leaf_edits.is_empty() {
            for edit in &section.leaf_edits {
                if let Err(reason) = apply_leaf_edit(&mut message, edit) {
                    stale.push(StaleEdit {
                        section_id: section.id.clone(),
                        path: Some(edit.path.clone()),
                        reason,
                    });
                }
            }
            if section.pending_text().is_some() {
                stale.push(StaleEdit {
                    section_id: section.id.clone(),
                    path: None,
                    reason: "aggregate text superseded by leaf edits".to_string(),
                });
            }
        } else if let Some(text) = section.pending_text() {
            apply_aggregate_text(&mut message, text);
        }

        messages.push(message);
    }

    Recomposed { messages, stale }
}

/// Deep copy of the message a section edits against.
pub fn base_message(original: &[Message], section: &Section) -> Message {
    section
        .message
        .clone()
        .or_else(|| original.get(section.source_message_index).cloned())
        .unwrap_or_else(|| Message::shell(section.kind.role()))
}

/// Check that `path` resolves to an editable leaf of `message`.
pub fn resolve_path(message: &Message, path: &EditPath) -> Result<(), String> {
    match path {
        EditPath::Content { index } => match message.content.get(*index) {
            Some(ContentPart::Text { .. }) => Ok(()),
            Some(other) => Err(format!("content[{index}] is a {} part", other.kind())),
            None => Err(format!(
                "content[{index}] out of range ({} parts)",
                message.content.len()
            )),
        },
        EditPath::ToolCallArguments { index } => {
            if *index < message.tool_calls.len() {
                Ok(())
            } else {
                Err(format!(
                    "tool_calls[{index}] out of range ({} calls)",
                    message.tool_calls.len()
                ))
            }
        }
        EditPath::Name => Ok(()),
    }
}

pub fn apply_leaf_edit(message: &mut Message, edit: &LeafEdit) -> Result<(), String> {
    resolve_path(message, &edit.path)?;
    match edit.path {
        EditPath::Content { index } => {
            if let Some(ContentPart::Text { text }) = message.content.get_mut(index) {
                text.clone_from(&edit.value);
            }
        }
        EditPath::ToolCallArguments { index } => {
            if let Some(call) = message.tool_calls.get_mut(index) {
                call.arguments.clone_from(&edit.value);
            }
        }
        EditPath::Name => message.name = Some(edit.value.clone()),
    }
    Ok(())
}

/// Legacy whole-message text rewrite. Collapses text segmentation.
pub fn apply_aggregate_text(message: &mut Message, text: &str) {
    let kept: Vec<ContentPart> = message
        .content
        .drain(..)
        .filter(|part| !part.is_textual())
        .collect();
    message.content = std::iter::once(ContentPart::text(text))
        .chain(kept)
        .collect();
}

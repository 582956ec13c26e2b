use crate::key::{InterceptionKey, Surface};
use crate::message::{Message, Role};
use crate::recompose::{base_message, recompose, resolve_path, StaleEdit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Errors from section-level edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EditError {
    #[error("section not found: {section_id}")]
    NotFound { section_id: String },
    #[error("stale edit path {path} in {section_id}: {reason}")]
    StalePath {
        section_id: String,
        path: EditPath,
        reason: String,
    },
}

/// Sampling options forwarded to the transport untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// What the rendering stage knows about a request before it is intercepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSeed {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(default)]
    pub request_options: RequestOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityStatus {
    #[default]
    Unknown,
    Match,
    Mismatch,
}

impl ParityStatus {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Match => "match",
            Self::Mismatch => "mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_family: Option<String>,
    pub request_options: RequestOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_logged_hash: Option<String>,
    pub parity_status: ParityStatus,
}

/// UI-facing kind of a section. Mirrors the message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    System,
    User,
    Assistant,
    Tool,
}

impl SectionKind {
    pub fn role(&self) -> Role {
        match self {
            Self::System => Role::System,
            Self::User => Role::User,
            Self::Assistant => Role::Assistant,
            Self::Tool => Role::Tool,
        }
    }
}

impl From<Role> for SectionKind {
    fn from(role: Role) -> Self {
        match role {
            Role::System => Self::System,
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Tool => Self::Tool,
        }
    }
}

/// Address of a single editable leaf inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditPath {
    /// A text part at this index of `content`
    Content { index: usize },
    ToolCallArguments { index: usize },
    Name,
}

impl fmt::Display for EditPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content { index } => write!(f, "content[{index}]"),
            Self::ToolCallArguments { index } => write!(f, "tool_calls[{index}].arguments"),
            Self::Name => f.write_str("name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEdit {
    pub path: EditPath,
    pub value: String,
}

impl LeafEdit {
    pub fn new(path: EditPath, value: impl Into<String>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }
}

/// Editable projection of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub source_message_index: usize,
    pub kind: SectionKind,
    pub label: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_content: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaf_edits: Vec<LeafEdit>,
    /// Message this section was built from; carries non-text parts and
    /// tool-call linkage through text edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl Section {
    pub fn from_message(index: usize, message: &Message) -> Self {
        Self {
            id: section_id(index),
            source_message_index: index,
            kind: message.role.into(),
            label: section_label(message),
            content: message.display_text(),
            edited_content: None,
            deleted: false,
            leaf_edits: Vec::new(),
            message: Some(message.clone()),
        }
    }

    /// Aggregate text that differs from what was rendered.
    pub fn pending_text(&self) -> Option<&str> {
        self.edited_content
            .as_deref()
            .filter(|edited| *edited != self.content)
    }

    pub fn has_changes(&self) -> bool {
        self.deleted || !self.leaf_edits.is_empty() || self.pending_text().is_some()
    }

    /// Record a leaf edit, replacing any earlier edit of the same path.
    pub fn upsert_leaf_edit(&mut self, edit: LeafEdit) {
        match self.leaf_edits.iter_mut().find(|e| e.path == edit.path) {
            Some(existing) => existing.value = edit.value,
            None => self.leaf_edits.push(edit),
        }
    }
}

pub fn section_id(index: usize) -> String {
    format!("section-{index}")
}

fn section_label(message: &Message) -> String {
    let mut label = message.role.display().to_string();
    if let Some(name) = message.name.as_deref().filter(|n| !n.is_empty()) {
        label.push_str(&format!(" ({name})"));
    }
    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            let count = message.tool_calls.len();
            let noun = if count == 1 { "tool call" } else { "tool calls" };
            label.push_str(&format!(" · {count} {noun}"));
        }
        Role::Tool => {
            if let Some(id) = message.tool_call_id.as_deref().filter(|id| !id.is_empty()) {
                label.push_str(&format!(" · {id}"));
            }
        }
        _ => {}
    }
    label
}

/// One section per message, in order. Deterministic for a given input.
pub fn build_sections(messages: &[Message]) -> Vec<Section> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| Section::from_message(index, message))
        .collect()
}

/// Mutable snapshot of one outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableChatRequest {
    pub id: String,
    pub conversation_id: String,
    pub surface: Surface,
    pub model: String,
    pub messages: Vec<Message>,
    pub original_messages: Vec<Message>,
    pub sections: Vec<Section>,
    pub is_dirty: bool,
    pub metadata: RequestMetadata,
    /// Edits skipped by the most recent recomposition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_edits: Vec<StaleEdit>,
}

impl EditableChatRequest {
    pub fn build(key: &InterceptionKey, rendered: &[Message], seed: MetadataSeed) -> Self {
        let original_messages = rendered.to_vec();
        let sections = build_sections(&original_messages);
        let request_id = if seed.request_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            seed.request_id
        };

        Self {
            id: request_id.clone(),
            conversation_id: key.conversation_id.clone(),
            surface: key.surface.clone(),
            model: seed.model,
            messages: original_messages.clone(),
            original_messages,
            sections,
            is_dirty: false,
            metadata: RequestMetadata {
                request_id,
                created_at: Utc::now(),
                token_count: seed.token_count,
                max_prompt_tokens: seed.max_prompt_tokens,
                model_family: seed.model_family,
                request_options: seed.request_options,
                payload_hash: None,
                last_logged_hash: None,
                parity_status: ParityStatus::Unknown,
            },
            stale_edits: Vec::new(),
        }
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    fn section_mut(&mut self, section_id: &str) -> Result<&mut Section, EditError> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| EditError::NotFound {
                section_id: section_id.to_string(),
            })
    }

    pub fn update_section_content(
        &mut self,
        section_id: &str,
        new_content: impl Into<String>,
    ) -> Result<(), EditError> {
        let section = self.section_mut(section_id)?;
        section.edited_content = Some(new_content.into());
        section.deleted = false;
        self.recompute_messages();
        Ok(())
    }

    /// Primary edit path: replace one leaf of the section's message.
    pub fn set_leaf_edit(
        &mut self,
        section_id: &str,
        path: EditPath,
        value: impl Into<String>,
    ) -> Result<(), EditError> {
        let section = self.section(section_id).ok_or_else(|| EditError::NotFound {
            section_id: section_id.to_string(),
        })?;
        let base = base_message(&self.original_messages, section);
        if let Err(reason) = resolve_path(&base, &path) {
            return Err(EditError::StalePath {
                section_id: section_id.to_string(),
                path,
                reason,
            });
        }

        let section = self.section_mut(section_id)?;
        section.upsert_leaf_edit(LeafEdit::new(path, value));
        section.deleted = false;
        self.recompute_messages();
        Ok(())
    }

    pub fn clear_leaf_edits(&mut self, section_id: &str) -> Result<(), EditError> {
        self.section_mut(section_id)?.leaf_edits.clear();
        self.recompute_messages();
        Ok(())
    }

    pub fn delete_section(&mut self, section_id: &str) -> Result<(), EditError> {
        self.section_mut(section_id)?.deleted = true;
        self.recompute_messages();
        Ok(())
    }

    pub fn restore_section(&mut self, section_id: &str) -> Result<(), EditError> {
        self.section_mut(section_id)?.deleted = false;
        self.recompute_messages();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.messages = self.original_messages.clone();
        self.sections = build_sections(&self.original_messages);
        self.stale_edits.clear();
        self.is_dirty = false;
    }

    /// Rebuild `messages` from the sections and refresh the dirty flag.
    pub fn recompute_messages(&mut self) -> &[StaleEdit] {
        let recomposed = recompose(&self.original_messages, &self.sections);
        self.messages = recomposed.messages;
        self.stale_edits = recomposed.stale;
        self.is_dirty = self.messages != self.original_messages;
        &self.stale_edits
    }

    /// Ids of sections carrying edits or deletions.
    pub fn diff_summary(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.has_changes())
            .map(|s| s.id.as_str())
            .collect()
    }
}

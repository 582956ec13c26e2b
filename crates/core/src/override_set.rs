//! Section edits captured from one reviewed turn and replayed on later turns.
//!
//! Overrides are matched to fresh sections by `source_message_index`, never by
//! section instance, so the same set keeps applying while history grows. An
//! override whose target no longer fits is skipped and reported.

use crate::key::InterceptionKey;
use crate::message::Message;
use crate::recompose::{base_message, resolve_path};
use crate::request::{EditPath, LeafEdit, Section, SectionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideScope {
    #[default]
    Session,
    Workspace,
}

impl OverrideScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Workspace => "workspace",
        }
    }
}

/// Stored edits for one section position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOverride {
    pub source_message_index: usize,
    pub kind: SectionKind,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaf_edits: Vec<LeafEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSet {
    pub name: String,
    pub scope: OverrideScope,
    pub key: InterceptionKey,
    pub source_request_id: String,
    pub captured_at: DateTime<Utc>,
    pub edits: Vec<SectionOverride>,
}

impl OverrideSet {
    /// Capture every edited, deleted or leaf-edited section.
    pub fn capture(
        key: &InterceptionKey,
        scope: OverrideScope,
        source_request_id: &str,
        sections: &[Section],
    ) -> Self {
        let captured_at = Utc::now();
        let edits = sections
            .iter()
            .filter(|s| s.has_changes())
            .map(|s| SectionOverride {
                source_message_index: s.source_message_index,
                kind: s.kind,
                deleted: s.deleted,
                content: s.pending_text().map(str::to_string),
                leaf_edits: s.leaf_edits.clone(),
            })
            .collect();

        Self {
            name: format!("{key} {}", captured_at.to_rfc3339()),
            scope,
            key: key.clone(),
            source_request_id: source_request_id.to_string(),
            captured_at,
            edits,
        }
    }

    /// Merge the stored edits onto freshly built sections.
    pub fn apply_to(&self, sections: &mut [Section], original: &[Message]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for edit in &self.edits {
            let Some(section) = sections
                .iter_mut()
                .find(|s| s.source_message_index == edit.source_message_index)
            else {
                report.skip(edit, None, "no section at this position");
                continue;
            };

            if section.kind != edit.kind {
                report.skip(edit, None, "section kind changed");
                continue;
            }

            let base = base_message(original, section);
            let mut touched = false;
            for leaf in &edit.leaf_edits {
                match resolve_path(&base, &leaf.path) {
                    Ok(()) => {
                        section.upsert_leaf_edit(leaf.clone());
                        touched = true;
                    }
                    Err(reason) => report.skip(edit, Some(leaf.path.clone()), &reason),
                }
            }
            if let Some(content) = &edit.content {
                section.edited_content = Some(content.clone());
                touched = true;
            }
            if edit.deleted {
                section.deleted = true;
                touched = true;
            }
            if touched {
                report.applied += 1;
            }
        }

        report
    }
}

/// Outcome of replaying an override set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: Vec<SkippedOverride>,
}

impl ApplyReport {
    fn skip(&mut self, edit: &SectionOverride, path: Option<EditPath>, reason: &str) {
        self.skipped.push(SkippedOverride {
            source_message_index: edit.source_message_index,
            path,
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOverride {
    pub source_message_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<EditPath>,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
#[error("override backend error: {0}")]
pub struct BackendError(pub String);

/// Durable storage for workspace-scoped override sets.
pub trait OverrideBackend {
    fn load(&self, key: &InterceptionKey) -> Result<Option<OverrideSet>, BackendError>;
    fn save(&self, set: &OverrideSet) -> Result<(), BackendError>;
    fn remove(&self, key: &InterceptionKey) -> Result<(), BackendError>;
}

//! File formats the CLI reads: rendered turns, edit scripts and request logs.

use anyhow::{Context, Result};
use promptgate_core::{EditPath, InterceptionKey, Message, MetadataSeed, Surface};
use promptgate_engine::{Interceptor, LogLookupError, RequestLogSource, TurnId};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Output of the rendering stage for one turn.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedTurn {
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub seed: MetadataSeed,
}

pub fn read_turn(path: &Path) -> Result<RenderedTurn> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read turn at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse turn at {}", path.display()))
}

pub fn interception_key(conversation: &str, surface: &str) -> InterceptionKey {
    InterceptionKey::new(conversation, Surface::from(surface.to_string()))
}

/// One operator edit, applied in file order.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionEditSpec {
    pub section: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub path: Option<EditPath>,
    #[serde(default)]
    pub value: Option<String>,
}

pub fn read_edits(path: &Path) -> Result<Vec<SectionEditSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read edits at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse edits at {}", path.display()))
}

pub fn apply_edits(
    interceptor: &mut Interceptor,
    key: &InterceptionKey,
    turn: TurnId,
    edits: &[SectionEditSpec],
) -> Result<()> {
    for edit in edits {
        let section = edit.section.as_str();
        if edit.delete {
            interceptor.delete_section(key, turn, section)?;
            continue;
        }
        if let Some(path) = &edit.path {
            let value = edit.value.clone().unwrap_or_default();
            interceptor
                .set_leaf_edit(key, turn, section, path.clone(), value)
                .with_context(|| format!("Failed to edit {section} at {path}"))?;
        }
        if let Some(content) = &edit.content {
            interceptor.update_section(key, turn, section, content.clone())?;
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LogLine {
    request_id: String,
    payload_hash: String,
}

/// JSONL request log, one `{"request_id", "payload_hash"}` object per line.
pub struct JsonlRequestLog {
    path: PathBuf,
}

impl JsonlRequestLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RequestLogSource for JsonlRequestLog {
    async fn logged_hash(&self, request_id: &str) -> Result<Option<String>, LogLookupError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| LogLookupError::Unavailable(format!("{}: {e}", self.path.display())))?;
        // Last record wins when a request id was logged more than once.
        let mut found = None;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LogLine>(line) {
                Ok(entry) if entry.request_id == request_id => found = Some(entry.payload_hash),
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping malformed request log line: {e}"),
            }
        }
        Ok(found)
    }
}

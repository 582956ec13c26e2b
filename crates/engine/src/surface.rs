//! Read-only projections of a request for the editing surface.

use promptgate_core::hash::canonical_payload;
use promptgate_core::{EditableChatRequest, ParityStatus};
use promptgate_runtime_config::DisplaySettings;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRow {
    pub field: String,
    pub label: &'static str,
    pub value: String,
}

/// One row per configured metadata field that has a value.
pub fn metadata_rows(request: &EditableChatRequest, display: &DisplaySettings) -> Vec<MetadataRow> {
    display
        .metadata_fields
        .iter()
        .filter_map(|field| {
            let (label, value) = metadata_value(request, field)?;
            Some(MetadataRow {
                field: field.clone(),
                label,
                value,
            })
        })
        .collect()
}

fn metadata_value(request: &EditableChatRequest, field: &str) -> Option<(&'static str, String)> {
    let metadata = &request.metadata;
    match field {
        "request_id" => Some(("Request", metadata.request_id.clone())),
        "model" => Some(("Model", request.model.clone())).filter(|(_, v)| !v.is_empty()),
        "model_family" => metadata.model_family.clone().map(|v| ("Model family", v)),
        "created_at" => Some(("Created", metadata.created_at.to_rfc3339())),
        "token_count" => metadata.token_count.map(|v| ("Tokens", v.to_string())),
        "max_prompt_tokens" => metadata
            .max_prompt_tokens
            .map(|v| ("Prompt budget", v.to_string())),
        "temperature" => metadata
            .request_options
            .temperature
            .map(|v| ("Temperature", v.to_string())),
        "payload_hash" => metadata.payload_hash.clone().map(|v| ("Payload hash", v)),
        "last_logged_hash" => metadata
            .last_logged_hash
            .clone()
            .map(|v| ("Logged hash", v)),
        "parity" => Some(("Parity", parity_text(request))),
        _ => None,
    }
}

fn parity_text(request: &EditableChatRequest) -> String {
    let metadata = &request.metadata;
    match metadata.parity_status {
        ParityStatus::Mismatch => format!(
            "mismatch (payload {}, logged {})",
            short_hash(metadata.payload_hash.as_deref()),
            short_hash(metadata.last_logged_hash.as_deref())
        ),
        status => status.display().to_string(),
    }
}

fn short_hash(hash: Option<&str>) -> &str {
    match hash {
        Some(hash) => hash.get(..12).unwrap_or(hash),
        None => "-",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutlineEntry {
    Section {
        id: String,
        label: String,
        edited: bool,
        deleted: bool,
    },
    RequestOptions {
        json: String,
    },
    RawPayload {
        json: String,
    },
}

/// Sections in order, followed by the optional request-options and raw-payload entries.
pub fn outline(request: &EditableChatRequest, display: &DisplaySettings) -> Vec<OutlineEntry> {
    let mut entries: Vec<OutlineEntry> = request
        .sections
        .iter()
        .map(|section| OutlineEntry::Section {
            id: section.id.clone(),
            label: section.label.clone(),
            edited: section.pending_text().is_some() || !section.leaf_edits.is_empty(),
            deleted: section.deleted,
        })
        .collect();

    if display.show_request_options {
        if let Ok(json) = serde_json::to_string_pretty(&request.metadata.request_options) {
            entries.push(OutlineEntry::RequestOptions { json });
        }
    }
    if display.show_raw_payload {
        if let Ok(json) = canonical_payload(&request.messages, &request.metadata.request_options)
        {
            entries.push(OutlineEntry::RawPayload { json });
        }
    }

    entries
}

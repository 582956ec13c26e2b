use crate::config::load_config;
use crate::turn::{read_turn, JsonlRequestLog};
use anyhow::Result;
use promptgate_core::hash::payload_hash;
use promptgate_core::validate::validate_messages;
use promptgate_core::{EditableChatRequest, InterceptionKey};
use promptgate_engine::{metadata_rows, outline, parity, OutlineEntry};
use std::path::{Path, PathBuf};

/// Show how a rendered turn would appear for review.
pub async fn run_inspect(
    file: &Path,
    key: &InterceptionKey,
    request_log: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let turn = read_turn(file)?;
    let mut request = EditableChatRequest::build(key, &turn.messages, turn.seed);
    parity::record_payload(&mut request.metadata, &request.messages);
    if let Some(path) = request_log {
        parity::reconcile(&JsonlRequestLog::new(path), &mut request.metadata).await;
    }

    let rows = metadata_rows(&request, &config.display);
    let entries = outline(&request, &config.display);
    let problems: Vec<String> = validate_messages(&request.messages)
        .err()
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect();

    if json {
        let doc = serde_json::json!({
            "key": key.to_string(),
            "metadata": rows,
            "outline": entries,
            "problems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Request for {key}");
    for row in &rows {
        println!("  {:<14} {}", row.label, row.value);
    }
    println!();
    for entry in &entries {
        match entry {
            OutlineEntry::Section { id, label, .. } => {
                let preview = request
                    .section(id)
                    .map(|s| first_line(&s.content))
                    .unwrap_or_default();
                println!("  {id:<11} {label:<28} {preview}");
            }
            OutlineEntry::RequestOptions { json } => {
                println!();
                println!("Request options:");
                println!("{json}");
            }
            OutlineEntry::RawPayload { json } => {
                println!();
                println!("Raw payload:");
                println!("{json}");
            }
        }
    }
    if !problems.is_empty() {
        println!();
        println!("Schema problems:");
        for problem in &problems {
            println!("  - {problem}");
        }
    }
    Ok(())
}

/// Print the payload hash the parity tracker would record.
pub fn run_hash(file: &Path) -> Result<()> {
    let turn = read_turn(file)?;
    let hash = payload_hash(&turn.messages, &turn.seed.request_options)?;
    println!("{hash}");
    Ok(())
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > 60 {
        let cut: String = line.chars().take(57).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

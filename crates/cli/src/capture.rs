use crate::config::{load_config, open_db};
use crate::turn::{apply_edits, read_edits, read_turn};
use anyhow::{bail, Context, Result};
use promptgate_core::{InterceptionKey, OverrideScope};
use promptgate_engine::{Interceptor, PersistentMode, RequestedMode, TurnDecision};
use std::path::Path;

fn interceptor() -> Result<Interceptor> {
    let config = load_config()?;
    let db = open_db(&config)?;
    Ok(Interceptor::new(&config.interceptor).with_backend(Box::new(db)))
}

/// Review a turn non-interactively: apply an edit script and store the result as an override set.
pub fn run_capture(
    file: &Path,
    edits_file: &Path,
    key: &InterceptionKey,
    scope: OverrideScope,
) -> Result<()> {
    let turn = read_turn(file)?;
    let edits = read_edits(edits_file)?;
    let mut interceptor = interceptor()?;

    interceptor.select(key, RequestedMode::Auto)?;
    if interceptor.mode(key).base() == PersistentMode::AutoApplying {
        interceptor.begin_capture(key)?;
    }

    let handle = match interceptor.on_turn_start(key, &turn.messages, turn.seed) {
        TurnDecision::PauseForReview(handle) => handle,
        _ => bail!("Turn for {key} was not paused for review"),
    };
    apply_edits(&mut interceptor, key, handle.turn, &edits)?;
    let outgoing = interceptor.resume_with_scope(key, scope)?;

    let set = interceptor
        .override_set(key)
        .context("No override set was captured")?;
    if scope == OverrideScope::Session {
        eprintln!("Warning: session-scoped overrides are not kept after this command exits.");
    }
    println!(
        "Captured {} ({} edits, {} scope)",
        set.name,
        set.edits.len(),
        scope.as_str()
    );
    if !outgoing.is_dirty {
        eprintln!("Warning: the edits did not change the payload.");
    }
    Ok(())
}

/// Replay the stored override set onto a freshly rendered turn and print the outgoing payload.
pub fn run_apply(file: &Path, key: &InterceptionKey) -> Result<()> {
    let turn = read_turn(file)?;
    let mut interceptor = interceptor()?;
    if interceptor.override_set(key).is_none() {
        bail!("No override set stored for {key}");
    }

    interceptor.select(key, RequestedMode::Auto)?;
    match interceptor.on_turn_start(key, &turn.messages, turn.seed) {
        TurnDecision::ApplyOverride {
            request,
            report,
            set_name,
        } => {
            for skipped in &report.skipped {
                eprintln!(
                    "Skipped override for message {}: {}",
                    skipped.source_message_index, skipped.reason
                );
            }
            let doc = serde_json::json!({
                "set_name": set_name,
                "applied": report.applied,
                "skipped": report.skipped,
                "request": request,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        _ => bail!("Override set for {key} was not applied"),
    }
}

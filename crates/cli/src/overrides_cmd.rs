use crate::config::{load_config, open_db};
use anyhow::{bail, Result};
use promptgate_core::InterceptionKey;

pub fn run_list() -> Result<()> {
    let db = open_db(&load_config()?)?;
    let rows = db.list_overrides()?;
    if rows.is_empty() {
        println!("No override sets stored.");
        return Ok(());
    }
    for row in rows {
        println!(
            "{:<32} {:<10} {:>3} edits  {}",
            row.key.to_string(),
            row.scope,
            row.edit_count,
            row.captured_at
        );
    }
    Ok(())
}

pub fn run_show(key: &InterceptionKey) -> Result<()> {
    let db = open_db(&load_config()?)?;
    match db.load_override(key)? {
        Some(set) => {
            println!("{}", serde_json::to_string_pretty(&set)?);
            Ok(())
        }
        None => bail!("No override set stored for {key}"),
    }
}

pub fn run_clear(key: Option<&InterceptionKey>) -> Result<()> {
    let db = open_db(&load_config()?)?;
    match key {
        Some(key) => {
            if db.remove_override(key)? {
                println!("Cleared override set for {key}.");
            } else {
                println!("No override set stored for {key}.");
            }
        }
        None => {
            let removed = db.clear_overrides()?;
            println!("Cleared {removed} override set(s).");
        }
    }
    Ok(())
}

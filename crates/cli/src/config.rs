use anyhow::{Context, Result};
use promptgate_local_db::LocalDb;
use promptgate_runtime_config::{
    apply_compat_fallbacks, DefaultMode, PromptgateConfig, ScopeSetting, CONFIG_FILE_NAME,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get the config directory path (~/.config/promptgate/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("promptgate"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn read_config(path: &Path) -> Result<PromptgateConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config = toml::from_str::<PromptgateConfig>(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Load config from disk, returning defaults if the file does not exist.
pub fn load_config() -> Result<PromptgateConfig> {
    let path = config_path()?;
    let mut config = if path.exists() {
        read_config(&path)?
    } else {
        PromptgateConfig::default()
    };
    if apply_compat_fallbacks(&mut config) {
        debug!("Normalized legacy values in {}", path.display());
    }
    Ok(config)
}

pub fn save_config(config: &PromptgateConfig) -> Result<()> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config dir at {}", dir.display()))?;

    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    let path = config_path()?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config at {}", path.display()))?;
    Ok(())
}

/// Open the override database configured in `[storage]`.
pub fn open_db(config: &PromptgateConfig) -> Result<LocalDb> {
    let configured = config.storage.database_path.trim();
    if configured.is_empty() {
        LocalDb::open()
    } else {
        LocalDb::open_path(&PathBuf::from(configured))
    }
}

/// Print current config.
pub fn show_config() -> Result<()> {
    let config = load_config()?;
    let path = config_path()?;
    println!("Config file: {}", path.display());
    println!();
    println!("[interceptor]");
    println!("  enabled                = {}", config.interceptor.enabled);
    println!(
        "  default_mode           = {}",
        config.interceptor.default_mode.display()
    );
    println!(
        "  default_override_scope = {}",
        match config.interceptor.default_override_scope {
            ScopeSetting::Workspace => "workspace",
            ScopeSetting::Session | ScopeSetting::Unknown => "session",
        }
    );
    println!();
    println!("[display]");
    println!(
        "  metadata_fields      = {}",
        config.display.metadata_fields.join(", ")
    );
    println!(
        "  show_request_options = {}",
        config.display.show_request_options
    );
    println!("  show_raw_payload     = {}", config.display.show_raw_payload);
    println!();
    println!("[storage]");
    println!(
        "  database_path = {}",
        if config.storage.database_path.is_empty() {
            "(default)"
        } else {
            config.storage.database_path.as_str()
        }
    );
    Ok(())
}

/// Update config with provided values.
pub fn set_config(
    enabled: Option<bool>,
    default_mode: Option<DefaultMode>,
    scope: Option<ScopeSetting>,
) -> Result<()> {
    let mut config = load_config()?;

    if let Some(enabled) = enabled {
        config.interceptor.enabled = enabled;
    }
    if let Some(mode) = default_mode {
        config.interceptor.default_mode = mode;
    }
    if let Some(scope) = scope {
        config.interceptor.default_override_scope = scope;
    }

    save_config(&config)?;
    println!("Configuration updated.");
    show_config()?;
    Ok(())
}

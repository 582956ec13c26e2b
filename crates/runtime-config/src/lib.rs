//! Shared promptgate configuration types.
//!
//! The CLI and any embedding host read `promptgate.toml` using these types.
//! Every field has a serde default so partial files are always accepted.

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "promptgate.toml";

/// Top-level configuration (persisted as `promptgate.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptgateConfig {
    #[serde(default)]
    pub interceptor: InterceptorSettings,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Mode every new conversation starts in.
    #[serde(default = "default_mode")]
    pub default_mode: DefaultMode,
    #[serde(default)]
    pub default_override_scope: ScopeSetting,
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_mode: DefaultMode::Off,
            default_override_scope: ScopeSetting::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultMode {
    Off,
    #[serde(alias = "review", alias = "review-always")]
    ReviewAlways,
    Auto,
    #[serde(other)]
    Unknown,
}

impl DefaultMode {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::ReviewAlways => "Review Always",
            Self::Auto => "Auto",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSetting {
    #[default]
    Session,
    Workspace,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Metadata rows shown next to the request, in order.
    #[serde(default = "default_metadata_fields")]
    pub metadata_fields: Vec<String>,
    #[serde(default = "default_true")]
    pub show_request_options: bool,
    #[serde(default = "default_false")]
    pub show_raw_payload: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            metadata_fields: default_metadata_fields(),
            show_request_options: true,
            show_raw_payload: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    /// Override database location; empty means the default data dir.
    #[serde(default)]
    pub database_path: String,
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_mode() -> DefaultMode {
    DefaultMode::Off
}

pub const METADATA_FIELDS: &[&str] = &[
    "request_id",
    "model",
    "model_family",
    "created_at",
    "token_count",
    "max_prompt_tokens",
    "temperature",
    "payload_hash",
    "last_logged_hash",
    "parity",
];

pub const DEFAULT_METADATA_FIELDS: &[&str] = &[
    "request_id",
    "model",
    "token_count",
    "max_prompt_tokens",
    "parity",
];

pub fn default_metadata_fields() -> Vec<String> {
    DEFAULT_METADATA_FIELDS
        .iter()
        .map(|field| (*field).to_string())
        .collect()
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut PromptgateConfig) -> bool {
    let mut changed = false;

    if config.interceptor.default_mode == DefaultMode::Unknown {
        config.interceptor.default_mode = DefaultMode::Off;
        changed = true;
    }

    if config.interceptor.default_override_scope == ScopeSetting::Unknown {
        config.interceptor.default_override_scope = ScopeSetting::Session;
        changed = true;
    }

    let before = config.display.metadata_fields.len();
    config
        .display
        .metadata_fields
        .retain(|field| METADATA_FIELDS.contains(&field.as_str()));
    if config.display.metadata_fields.len() != before {
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = PromptgateConfig::default();
        assert!(cfg.interceptor.enabled);
        assert_eq!(cfg.interceptor.default_mode, DefaultMode::Off);
        assert_eq!(cfg.interceptor.default_override_scope, ScopeSetting::Session);
        assert!(cfg.display.show_request_options);
        assert!(!cfg.display.show_raw_payload);
        assert_eq!(cfg.display.metadata_fields, default_metadata_fields());
        assert!(cfg.storage.database_path.is_empty());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: PromptgateConfig = toml::from_str("").expect("parse empty toml");
        assert!(cfg.interceptor.enabled);
        assert_eq!(cfg.display.metadata_fields, default_metadata_fields());
    }

    #[test]
    fn mode_aliases_are_accepted() {
        let cfg: PromptgateConfig = toml::from_str(
            r#"
[interceptor]
default_mode = "review"
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.interceptor.default_mode, DefaultMode::ReviewAlways);
    }

    #[test]
    fn apply_compat_fallbacks_normalizes_unknown_values() {
        let mut cfg: PromptgateConfig = toml::from_str(
            r#"
[interceptor]
default_mode = "sometimes"
default_override_scope = "global"

[display]
metadata_fields = ["model", "colour", "parity"]
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.interceptor.default_mode, DefaultMode::Unknown);

        let changed = apply_compat_fallbacks(&mut cfg);
        assert!(changed);
        assert_eq!(cfg.interceptor.default_mode, DefaultMode::Off);
        assert_eq!(cfg.interceptor.default_override_scope, ScopeSetting::Session);
        assert_eq!(
            cfg.display.metadata_fields,
            vec!["model".to_string(), "parity".to_string()]
        );
    }

    #[test]
    fn apply_compat_fallbacks_is_noop_for_modern_values() {
        let mut cfg = PromptgateConfig::default();
        cfg.interceptor.default_mode = DefaultMode::Auto;
        assert!(!apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.interceptor.default_mode, DefaultMode::Auto);
    }

    #[test]
    fn serializes_all_sections() {
        let encoded = toml::to_string(&PromptgateConfig::default()).expect("serialize config");
        assert!(encoded.contains("[interceptor]"));
        assert!(encoded.contains("default_mode = \"off\""));
        assert!(encoded.contains("[display]"));
        assert!(encoded.contains("[storage]"));
    }

    #[test]
    fn default_mode_display() {
        assert_eq!(DefaultMode::ReviewAlways.display(), "Review Always");
    }
}

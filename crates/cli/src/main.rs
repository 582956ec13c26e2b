mod capture;
mod config;
mod inspect;
mod overrides_cmd;
mod turn;

use clap::{Parser, Subcommand, ValueEnum};
use promptgate_core::OverrideScope;
use promptgate_runtime_config::{DefaultMode, ScopeSetting};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "promptgate", about = "Inspect, edit and replay outgoing LLM chat requests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct KeyArgs {
    /// Conversation id the turn belongs to
    #[arg(long, default_value = "default")]
    conversation: String,

    /// Chat surface (panel, inline, or any other name)
    #[arg(long, default_value = "panel")]
    surface: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a rendered turn the way it is presented for review
    Inspect {
        /// Rendered turn JSON (`messages` plus metadata)
        file: PathBuf,

        #[command(flatten)]
        key: KeyArgs,

        /// JSONL request log to check payload parity against
        #[arg(long)]
        request_log: Option<PathBuf>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply an edit script to a turn and store the result as an override set
    Capture {
        /// Rendered turn JSON
        file: PathBuf,

        /// Edit script JSON (list of section edits)
        #[arg(long)]
        edits: PathBuf,

        #[command(flatten)]
        key: KeyArgs,

        /// Where the captured set lives
        #[arg(long, value_enum, default_value_t = ScopeArg::Workspace)]
        scope: ScopeArg,
    },

    /// Replay the stored override set onto a turn and print the outgoing payload
    Apply {
        /// Rendered turn JSON
        file: PathBuf,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Print the payload hash of a rendered turn
    Hash {
        /// Rendered turn JSON
        file: PathBuf,
    },

    /// Manage persisted override sets
    Overrides {
        #[command(subcommand)]
        action: OverridesAction,
    },

    /// Show or set configuration
    Config {
        /// Enable or disable interception
        #[arg(long)]
        enabled: Option<bool>,

        /// Mode new conversations start in
        #[arg(long, value_enum)]
        default_mode: Option<ModeArg>,

        /// Scope used when resuming a captured turn
        #[arg(long, value_enum)]
        default_scope: Option<ScopeArg>,
    },
}

#[derive(Subcommand)]
enum OverridesAction {
    /// List stored override sets
    List,
    /// Print one override set as JSON
    Show {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Remove one override set, or all of them with --all
    Clear {
        #[command(flatten)]
        key: KeyArgs,

        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Off,
    ReviewAlways,
    Auto,
}

impl From<ModeArg> for DefaultMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Off => Self::Off,
            ModeArg::ReviewAlways => Self::ReviewAlways,
            ModeArg::Auto => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Session,
    Workspace,
}

impl From<ScopeArg> for ScopeSetting {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Session => Self::Session,
            ScopeArg::Workspace => Self::Workspace,
        }
    }
}

impl From<ScopeArg> for OverrideScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Session => Self::Session,
            ScopeArg::Workspace => Self::Workspace,
        }
    }
}

impl KeyArgs {
    fn key(&self) -> promptgate_core::InterceptionKey {
        turn::interception_key(&self.conversation, &self.surface)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect {
            file,
            key,
            request_log,
            json,
        } => inspect::run_inspect(&file, &key.key(), request_log, json).await,
        Commands::Capture {
            file,
            edits,
            key,
            scope,
        } => capture::run_capture(&file, &edits, &key.key(), scope.into()),
        Commands::Apply { file, key } => capture::run_apply(&file, &key.key()),
        Commands::Hash { file } => inspect::run_hash(&file),
        Commands::Overrides { action } => match action {
            OverridesAction::List => overrides_cmd::run_list(),
            OverridesAction::Show { key } => overrides_cmd::run_show(&key.key()),
            OverridesAction::Clear { key, all } => {
                if all {
                    overrides_cmd::run_clear(None)
                } else {
                    overrides_cmd::run_clear(Some(&key.key()))
                }
            }
        },
        Commands::Config {
            enabled,
            default_mode,
            default_scope,
        } => {
            if enabled.is_none() && default_mode.is_none() && default_scope.is_none() {
                config::show_config()
            } else {
                config::set_config(
                    enabled,
                    default_mode.map(Into::into),
                    default_scope.map(Into::into),
                )
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

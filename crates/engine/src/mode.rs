//! Interception mode state machine.
//!
//! `transition` is pure: it maps the current state and a command to the next
//! state plus the side effects the interceptor has to carry out. Capture is
//! armed exactly while the persistent mode is `AutoCapturing`.

use crate::error::InterceptError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistentMode {
    Off,
    ReviewAlways,
    AutoCapturing,
    AutoApplying,
}

impl PersistentMode {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::ReviewAlways => "Review always",
            Self::AutoCapturing => "Auto (capturing)",
            Self::AutoApplying => "Auto (applying)",
        }
    }

    fn is_auto(&self) -> bool {
        matches!(self, Self::AutoCapturing | Self::AutoApplying)
    }
}

/// Current mode of one key. A one-shot review wraps the mode it interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModeState {
    Persistent { mode: PersistentMode },
    OneShotReview { prior: PersistentMode },
}

impl ModeState {
    pub const OFF: Self = Self::Persistent {
        mode: PersistentMode::Off,
    };

    pub fn persistent(mode: PersistentMode) -> Self {
        Self::Persistent { mode }
    }

    /// The persistent mode in effect, or the one restored after a one-shot review.
    pub fn base(&self) -> PersistentMode {
        match *self {
            Self::Persistent { mode } => mode,
            Self::OneShotReview { prior } => prior,
        }
    }

    fn with_base(&self, mode: PersistentMode) -> Self {
        match self {
            Self::Persistent { .. } => Self::Persistent { mode },
            Self::OneShotReview { .. } => Self::OneShotReview { prior: mode },
        }
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent { mode } => f.write_str(mode.display()),
            Self::OneShotReview { prior } => {
                write!(f, "One-shot review (then {})", prior.display())
            }
        }
    }
}

/// Mode an operator can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedMode {
    Off,
    ReviewAlways,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Resumed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    Select(RequestedMode),
    RequestOneShotReview,
    BeginCapture,
    ClearOverride,
    Resolve(TurnOutcome),
    Disable,
}

impl ModeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select(RequestedMode::Off) => "select off",
            Self::Select(RequestedMode::ReviewAlways) => "select review-always",
            Self::Select(RequestedMode::Auto) => "select auto",
            Self::RequestOneShotReview => "request one-shot review",
            Self::BeginCapture => "capture new edits",
            Self::ClearOverride => "clear override",
            Self::Resolve(TurnOutcome::Resumed) => "resume",
            Self::Resolve(TurnOutcome::Cancelled) => "cancel",
            Self::Disable => "disable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CancelPending,
    SaveOverride,
    RemoveOverride,
    ClearAll,
}

/// Facts about a key the transition guards depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    pub has_override: bool,
    pub has_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ModeState,
    pub to: ModeState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: ModeState) -> Self {
        Self {
            from: state,
            to: state,
            effects: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub fn transition(
    state: ModeState,
    command: ModeCommand,
    guards: Guards,
) -> Result<Transition, InterceptError> {
    let invalid = || InterceptError::InvalidTransition {
        command: command.name(),
        state: state.to_string(),
    };
    let mut effects = Vec::new();

    let to = match command {
        ModeCommand::Select(RequestedMode::Off) => {
            if guards.has_pending {
                effects.push(Effect::CancelPending);
            }
            ModeState::OFF
        }
        ModeCommand::Select(requested) => state.with_base(select(state.base(), requested, guards)),
        ModeCommand::RequestOneShotReview => match state {
            ModeState::Persistent { mode } => ModeState::OneShotReview { prior: mode },
            ModeState::OneShotReview { .. } => state,
        },
        ModeCommand::BeginCapture => match state.base() {
            PersistentMode::AutoApplying => state.with_base(PersistentMode::AutoCapturing),
            _ => return Err(invalid()),
        },
        ModeCommand::ClearOverride => {
            if guards.has_override {
                effects.push(Effect::RemoveOverride);
            }
            match state.base() {
                PersistentMode::AutoApplying => state.with_base(PersistentMode::AutoCapturing),
                _ => state,
            }
        }
        ModeCommand::Resolve(outcome) => {
            if !guards.has_pending {
                return Err(invalid());
            }
            match (state, outcome) {
                (ModeState::OneShotReview { prior }, _) => ModeState::persistent(prior),
                (
                    ModeState::Persistent {
                        mode: PersistentMode::AutoCapturing,
                    },
                    TurnOutcome::Resumed,
                ) => {
                    effects.push(Effect::SaveOverride);
                    ModeState::persistent(PersistentMode::AutoApplying)
                }
                (ModeState::Persistent { .. }, _) => state,
            }
        }
        ModeCommand::Disable => {
            effects.push(Effect::ClearAll);
            ModeState::OFF
        }
    };

    if to == state && effects.is_empty() {
        return Ok(Transition::stay(state));
    }
    Ok(Transition {
        from: state,
        to,
        effects,
    })
}

fn select(current: PersistentMode, requested: RequestedMode, guards: Guards) -> PersistentMode {
    match requested {
        RequestedMode::Off => PersistentMode::Off,
        RequestedMode::ReviewAlways => PersistentMode::ReviewAlways,
        RequestedMode::Auto if current.is_auto() => current,
        RequestedMode::Auto if guards.has_override => PersistentMode::AutoApplying,
        RequestedMode::Auto => PersistentMode::AutoCapturing,
    }
}

/// What to do with a turn that is about to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPlan {
    Send,
    Pause,
    Apply,
    /// Auto-applying without a stored set: fall back to capturing.
    Recapture,
}

pub fn plan_turn(state: ModeState, has_override: bool) -> TurnPlan {
    match state {
        ModeState::OneShotReview { .. } => TurnPlan::Pause,
        ModeState::Persistent { mode } => match mode {
            PersistentMode::Off => TurnPlan::Send,
            PersistentMode::ReviewAlways | PersistentMode::AutoCapturing => TurnPlan::Pause,
            PersistentMode::AutoApplying if has_override => TurnPlan::Apply,
            PersistentMode::AutoApplying => TurnPlan::Recapture,
        },
    }
}

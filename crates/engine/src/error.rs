use promptgate_core::EditError;

/// Recoverable interception errors. None of these leave a key in a broken state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InterceptError {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("invalid transition: cannot {command} while {state}")]
    InvalidTransition { command: &'static str, state: String },
    #[error("{turn} for {key} is no longer pending")]
    TurnNotPending { key: String, turn: String },
    #[error("interception is disabled")]
    Disabled,
}

//! Interception engine for promptgate.
//!
//! [`Interceptor`] decides per `InterceptionKey` whether an outgoing turn is
//! sent, paused for review or rewritten from a stored override set. The
//! building blocks are usable on their own: [`mode`] is the pure transition
//! table, [`overrides`] the override store, [`parity`] the log reconciliation
//! and [`surface`] the read-only projections shown to an operator.

pub mod error;
pub mod interceptor;
pub mod mode;
pub mod overrides;
pub mod parity;
pub mod surface;

pub use error::InterceptError;
pub use interceptor::{
    Interceptor, OutgoingRequest, PendingTurnHandle, TurnDecision, TurnId, TurnResolution,
};
pub use mode::{ModeState, PersistentMode, RequestedMode, TurnOutcome};
pub use overrides::OverrideStore;
pub use parity::{LogLookupError, ParityReport, RequestLogSource};
pub use surface::{metadata_rows, outline, MetadataRow, OutlineEntry};

//! Reconciles the payload we produced with what the request log recorded.
//!
//! Parity is advisory: a mismatch is logged and surfaced, never blocks a send.

use promptgate_core::hash::payload_hash;
use promptgate_core::{Message, ParityStatus, RequestMetadata};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogLookupError {
    #[error("request log unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the request log that independently records sent payloads.
pub trait RequestLogSource {
    /// Hash recorded for `request_id`, or `None` if nothing is logged yet.
    fn logged_hash(
        &self,
        request_id: &str,
    ) -> impl Future<Output = Result<Option<String>, LogLookupError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityReport {
    pub request_id: String,
    pub status: ParityStatus,
    pub payload_hash: Option<String>,
    pub logged_hash: Option<String>,
}

pub fn resolve_parity(payload: Option<&str>, logged: Option<&str>) -> ParityStatus {
    match (payload, logged) {
        (Some(payload), Some(logged)) if payload == logged => ParityStatus::Match,
        (Some(_), Some(_)) => ParityStatus::Mismatch,
        _ => ParityStatus::Unknown,
    }
}

/// Hash the outgoing payload into `metadata` and reset its parity.
pub fn record_payload(metadata: &mut RequestMetadata, messages: &[Message]) -> Option<String> {
    metadata.payload_hash = match payload_hash(messages, &metadata.request_options) {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!("Failed to hash payload for {}: {e}", metadata.request_id);
            None
        }
    };
    metadata.last_logged_hash = None;
    metadata.parity_status = ParityStatus::Unknown;
    metadata.payload_hash.clone()
}

/// Store the logged hash and resolve parity against the payload hash.
pub fn apply_logged_hash(metadata: &mut RequestMetadata, logged: Option<String>) -> ParityReport {
    metadata.last_logged_hash = logged;
    metadata.parity_status = resolve_parity(
        metadata.payload_hash.as_deref(),
        metadata.last_logged_hash.as_deref(),
    );

    match metadata.parity_status {
        ParityStatus::Mismatch => warn!(
            "Parity mismatch for {}: payload {} vs logged {}",
            metadata.request_id,
            metadata.payload_hash.as_deref().unwrap_or("-"),
            metadata.last_logged_hash.as_deref().unwrap_or("-"),
        ),
        ParityStatus::Match => debug!("Parity match for {}", metadata.request_id),
        ParityStatus::Unknown => debug!("Parity unknown for {}", metadata.request_id),
    }

    ParityReport {
        request_id: metadata.request_id.clone(),
        status: metadata.parity_status,
        payload_hash: metadata.payload_hash.clone(),
        logged_hash: metadata.last_logged_hash.clone(),
    }
}

/// Fetch the logged hash and update `metadata`. Lookup failures leave parity unknown.
pub async fn reconcile<S: RequestLogSource>(
    source: &S,
    metadata: &mut RequestMetadata,
) -> ParityReport {
    let logged = match source.logged_hash(&metadata.request_id).await {
        Ok(logged) => logged,
        Err(e) => {
            warn!("Parity lookup failed for {}: {e}", metadata.request_id);
            None
        }
    };
    apply_logged_hash(metadata, logged)
}

//! Per-key interception facade.
//!
//! Every `InterceptionKey` owns an independent slice: its mode, at most one
//! pending turn and the last request that left the interceptor. Override sets
//! live in a shared `OverrideStore` but are only ever touched by their own key.

use crate::error::InterceptError;
use crate::mode::{
    self, Effect, Guards, ModeCommand, ModeState, PersistentMode, RequestedMode, Transition,
    TurnOutcome, TurnPlan,
};
use crate::overrides::OverrideStore;
use crate::parity::{self, ParityReport, RequestLogSource};
use promptgate_core::validate::validate_messages;
use promptgate_core::{
    ApplyReport, EditPath, EditableChatRequest, InterceptionKey, Message, MetadataSeed,
    OverrideBackend, OverrideScope, OverrideSet, RequestOptions,
};
use promptgate_runtime_config::{DefaultMode, InterceptorSettings, ScopeSetting};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TurnId(u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Payload handed to the transport collaborator, sent exactly as given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingRequest {
    pub request_id: String,
    pub messages: Vec<Message>,
    pub options: RequestOptions,
    pub payload_hash: Option<String>,
    pub is_dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnResolution {
    Resumed(OutgoingRequest),
    Cancelled,
}

/// Held by the sending side while a turn waits for review.
#[derive(Debug)]
pub struct PendingTurnHandle {
    pub key: InterceptionKey,
    pub turn: TurnId,
    pub request_id: String,
    receiver: oneshot::Receiver<TurnResolution>,
}

impl PendingTurnHandle {
    /// Wait for the operator. A turn discarded without an answer counts as cancelled.
    pub async fn wait(self) -> TurnResolution {
        self.receiver.await.unwrap_or(TurnResolution::Cancelled)
    }

    /// Non-blocking poll; `None` while the turn is still under review.
    pub fn try_resolution(&mut self) -> Option<TurnResolution> {
        match self.receiver.try_recv() {
            Ok(resolution) => Some(resolution),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(TurnResolution::Cancelled),
        }
    }
}

#[derive(Debug)]
pub enum TurnDecision {
    SendImmediately(OutgoingRequest),
    PauseForReview(PendingTurnHandle),
    ApplyOverride {
        request: OutgoingRequest,
        report: ApplyReport,
        set_name: String,
    },
}

struct PendingTurn {
    turn: TurnId,
    request: EditableChatRequest,
    resolver: oneshot::Sender<TurnResolution>,
}

impl PendingTurn {
    fn resolve(self, resolution: TurnResolution) {
        if self.resolver.send(resolution).is_err() {
            debug!("Nobody is waiting on {} any more", self.turn);
        }
    }
}

struct KeySlice {
    mode: ModeState,
    pending: Option<PendingTurn>,
    last_sent: Option<EditableChatRequest>,
}

pub struct Interceptor {
    enabled: bool,
    default_mode: DefaultMode,
    default_scope: OverrideScope,
    slices: HashMap<InterceptionKey, KeySlice>,
    overrides: OverrideStore,
    next_turn: u64,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new(&InterceptorSettings::default())
    }
}

impl Interceptor {
    pub fn new(settings: &InterceptorSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_mode: settings.default_mode,
            default_scope: match settings.default_override_scope {
                ScopeSetting::Workspace => OverrideScope::Workspace,
                ScopeSetting::Session | ScopeSetting::Unknown => OverrideScope::Session,
            },
            slices: HashMap::new(),
            overrides: OverrideStore::new(),
            next_turn: 1,
        }
    }

    /// Persist workspace-scoped override sets through `backend`.
    pub fn with_backend(mut self, backend: Box<dyn OverrideBackend>) -> Self {
        self.overrides = OverrideStore::with_backend(backend);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current mode. Keys that have never been touched report the mode their
    /// first turn will start in.
    pub fn mode(&self, key: &InterceptionKey) -> ModeState {
        if !self.enabled {
            return ModeState::OFF;
        }
        match self.slices.get(key) {
            Some(slice) => slice.mode,
            None => initial_mode(self.default_mode, || self.overrides.peek(key)),
        }
    }

    pub fn pending(&self, key: &InterceptionKey) -> Option<(TurnId, &EditableChatRequest)> {
        let pending = self.slices.get(key)?.pending.as_ref()?;
        Some((pending.turn, &pending.request))
    }

    pub fn last_sent(&self, key: &InterceptionKey) -> Option<&EditableChatRequest> {
        self.slices.get(key)?.last_sent.as_ref()
    }

    pub fn override_set(&mut self, key: &InterceptionKey) -> Option<&OverrideSet> {
        self.overrides.get(key)
    }

    // ── Mode commands ───────────────────────────────────────────────────────

    pub fn select(
        &mut self,
        key: &InterceptionKey,
        requested: RequestedMode,
    ) -> Result<ModeState, InterceptError> {
        self.command(key, ModeCommand::Select(requested))
    }

    pub fn request_one_shot_review(
        &mut self,
        key: &InterceptionKey,
    ) -> Result<ModeState, InterceptError> {
        self.command(key, ModeCommand::RequestOneShotReview)
    }

    /// Re-arm capture so the next reviewed turn replaces the stored set.
    pub fn begin_capture(&mut self, key: &InterceptionKey) -> Result<ModeState, InterceptError> {
        self.command(key, ModeCommand::BeginCapture)
    }

    pub fn clear_override(&mut self, key: &InterceptionKey) -> Result<ModeState, InterceptError> {
        self.command(key, ModeCommand::ClearOverride)
    }

    /// Turning interception off is a hard reset of every key.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            info!("Interception enabled");
            return;
        }

        for (key, slice) in self.slices.drain() {
            if let Some(pending) = slice.pending {
                debug!("Discarding {} for {key}", pending.turn);
                pending.resolve(TurnResolution::Cancelled);
            }
        }
        self.overrides.reset();
        info!("Interception disabled, all keys reset");
    }

    fn command(
        &mut self,
        key: &InterceptionKey,
        command: ModeCommand,
    ) -> Result<ModeState, InterceptError> {
        if !self.enabled {
            return Err(InterceptError::Disabled);
        }
        let transition = self.plan_transition(key, command)?;
        for effect in &transition.effects {
            match effect {
                Effect::CancelPending => self.discard_pending(key),
                Effect::RemoveOverride => {
                    self.overrides.clear(key);
                }
                Effect::SaveOverride | Effect::ClearAll => {}
            }
        }
        Ok(self.commit(key, command, &transition))
    }

    fn plan_transition(
        &mut self,
        key: &InterceptionKey,
        command: ModeCommand,
    ) -> Result<Transition, InterceptError> {
        let has_override = self.overrides.contains(key);
        let slice = self.slice(key);
        let guards = Guards {
            has_override,
            has_pending: slice.pending.is_some(),
        };
        mode::transition(slice.mode, command, guards).inspect_err(|e| {
            debug!("Rejected command for {key}: {e}");
        })
    }

    fn commit(
        &mut self,
        key: &InterceptionKey,
        command: ModeCommand,
        transition: &Transition,
    ) -> ModeState {
        if transition.changed() {
            debug!(
                "Mode for {key}: {} -> {} ({})",
                transition.from,
                transition.to,
                command.name()
            );
        }
        self.slice(key).mode = transition.to;
        transition.to
    }

    // ── Turn lifecycle ──────────────────────────────────────────────────────

    /// Decide what happens to a freshly rendered turn.
    pub fn on_turn_start(
        &mut self,
        key: &InterceptionKey,
        rendered: &[Message],
        seed: MetadataSeed,
    ) -> TurnDecision {
        let mut request = EditableChatRequest::build(key, rendered, seed);
        if !self.enabled {
            debug!("Interception disabled, sending {} unmodified", request.id);
            return TurnDecision::SendImmediately(outgoing(key, &mut request));
        }

        if self.slice(key).pending.is_some() {
            warn!("New turn for {key} supersedes the pending review");
            self.discard_pending(key);
        }

        let has_override = self.overrides.contains(key);
        let state = self.slice(key).mode;
        match mode::plan_turn(state, has_override) {
            TurnPlan::Send => TurnDecision::SendImmediately(self.send(key, request)),
            TurnPlan::Pause => TurnDecision::PauseForReview(self.pause(key, request)),
            TurnPlan::Recapture => {
                warn!("No override set stored for {key}, capturing from this turn");
                self.slice(key).mode = ModeState::persistent(PersistentMode::AutoCapturing);
                TurnDecision::PauseForReview(self.pause(key, request))
            }
            TurnPlan::Apply => {
                let Some(report) = self.overrides.apply(key, &mut request) else {
                    return TurnDecision::SendImmediately(self.send(key, request));
                };
                let set_name = self
                    .overrides
                    .get(key)
                    .map(|set| set.name.clone())
                    .unwrap_or_default();
                TurnDecision::ApplyOverride {
                    request: self.send(key, request),
                    report,
                    set_name,
                }
            }
        }
    }

    /// Send the pending turn, saving an override with the configured scope when capturing.
    pub fn resume(&mut self, key: &InterceptionKey) -> Result<OutgoingRequest, InterceptError> {
        self.resume_with_scope(key, self.default_scope)
    }

    pub fn resume_with_scope(
        &mut self,
        key: &InterceptionKey,
        scope: OverrideScope,
    ) -> Result<OutgoingRequest, InterceptError> {
        if !self.enabled {
            return Err(InterceptError::Disabled);
        }
        let command = ModeCommand::Resolve(TurnOutcome::Resumed);
        let transition = self.plan_transition(key, command)?;
        let Some(mut pending) = self.slice(key).pending.take() else {
            return Err(InterceptError::InvalidTransition {
                command: command.name(),
                state: transition.from.to_string(),
            });
        };

        pending.request.recompute_messages();
        if transition.effects.contains(&Effect::SaveOverride) {
            self.overrides.capture(key, scope, &pending.request);
        }
        self.commit(key, command, &transition);

        let outgoing = self.send(key, pending.request.clone());
        info!("Resumed {} for {key}", pending.turn);
        pending.resolve(TurnResolution::Resumed(outgoing.clone()));
        Ok(outgoing)
    }

    /// Drop the pending turn. Stored override sets are left untouched.
    pub fn cancel(&mut self, key: &InterceptionKey) -> Result<ModeState, InterceptError> {
        if !self.enabled {
            return Err(InterceptError::Disabled);
        }
        let command = ModeCommand::Resolve(TurnOutcome::Cancelled);
        let transition = self.plan_transition(key, command)?;
        self.discard_pending(key);
        Ok(self.commit(key, command, &transition))
    }

    // ── Edits on the pending turn ───────────────────────────────────────────

    pub fn update_section(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
        section_id: &str,
        content: impl Into<String>,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?
            .update_section_content(section_id, content)?;
        Ok(())
    }

    pub fn set_leaf_edit(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
        section_id: &str,
        path: EditPath,
        value: impl Into<String>,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?
            .set_leaf_edit(section_id, path, value)?;
        Ok(())
    }

    pub fn clear_leaf_edits(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
        section_id: &str,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?
            .clear_leaf_edits(section_id)?;
        Ok(())
    }

    pub fn delete_section(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
        section_id: &str,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?
            .delete_section(section_id)?;
        Ok(())
    }

    pub fn restore_section(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
        section_id: &str,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?
            .restore_section(section_id)?;
        Ok(())
    }

    pub fn reset_request(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
    ) -> Result<(), InterceptError> {
        self.pending_request_mut(key, turn)?.reset();
        Ok(())
    }

    // ── Parity ──────────────────────────────────────────────────────────────

    /// Compare the last payload sent for `key` with the request log.
    pub async fn reconcile_parity<S: RequestLogSource>(
        &mut self,
        key: &InterceptionKey,
        source: &S,
    ) -> Option<ParityReport> {
        let request = self.slices.get_mut(key)?.last_sent.as_mut()?;
        Some(parity::reconcile(source, &mut request.metadata).await)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Slice for `key`, created on first use.
    fn slice(&mut self, key: &InterceptionKey) -> &mut KeySlice {
        let default_mode = self.default_mode;
        let overrides = &mut self.overrides;
        self.slices
            .entry(key.clone())
            .or_insert_with(|| KeySlice {
                mode: initial_mode(default_mode, || overrides.contains(key)),
                pending: None,
                last_sent: None,
            })
    }

    fn pause(&mut self, key: &InterceptionKey, request: EditableChatRequest) -> PendingTurnHandle {
        let turn = TurnId(self.next_turn);
        self.next_turn += 1;
        let (resolver, receiver) = oneshot::channel();
        let handle = PendingTurnHandle {
            key: key.clone(),
            turn,
            request_id: request.id.clone(),
            receiver,
        };
        info!("Paused {turn} ({}) for review on {key}", request.id);
        self.slice(key).pending = Some(PendingTurn {
            turn,
            request,
            resolver,
        });
        handle
    }

    fn discard_pending(&mut self, key: &InterceptionKey) {
        if let Some(pending) = self.slices.get_mut(key).and_then(|s| s.pending.take()) {
            info!("Cancelled {} for {key}", pending.turn);
            pending.resolve(TurnResolution::Cancelled);
        }
    }

    /// Hand the payload over and remember it for parity checks.
    fn send(&mut self, key: &InterceptionKey, mut request: EditableChatRequest) -> OutgoingRequest {
        let outgoing = outgoing(key, &mut request);
        self.slice(key).last_sent = Some(request);
        outgoing
    }

    fn pending_request_mut(
        &mut self,
        key: &InterceptionKey,
        turn: TurnId,
    ) -> Result<&mut EditableChatRequest, InterceptError> {
        match self.slices.get_mut(key).and_then(|s| s.pending.as_mut()) {
            Some(pending) if pending.turn == turn => Ok(&mut pending.request),
            _ => {
                let err = InterceptError::TurnNotPending {
                    key: key.to_string(),
                    turn: turn.to_string(),
                };
                if cfg!(debug_assertions) {
                    panic!("edit after resolution: {err}");
                }
                Err(err)
            }
        }
    }
}

/// Mode a key starts in. An auto default starts out applying when a set
/// already exists for the key.
fn initial_mode(default_mode: DefaultMode, has_override: impl FnOnce() -> bool) -> ModeState {
    ModeState::persistent(match default_mode {
        DefaultMode::ReviewAlways => PersistentMode::ReviewAlways,
        DefaultMode::Auto if has_override() => PersistentMode::AutoApplying,
        DefaultMode::Auto => PersistentMode::AutoCapturing,
        DefaultMode::Off | DefaultMode::Unknown => PersistentMode::Off,
    })
}

/// Hash and validate the payload that leaves the interceptor.
fn outgoing(key: &InterceptionKey, request: &mut EditableChatRequest) -> OutgoingRequest {
    for stale in &request.stale_edits {
        match &stale.path {
            Some(path) => warn!(
                "Stale edit {}:{path} on {key}: {}",
                stale.section_id, stale.reason
            ),
            None => warn!("Stale edit {} on {key}: {}", stale.section_id, stale.reason),
        }
    }
    if let Err(violations) = validate_messages(&request.messages) {
        for violation in violations {
            warn!("Outgoing payload for {key} is invalid: {violation}");
        }
    }

    let payload_hash = parity::record_payload(&mut request.metadata, &request.messages);
    OutgoingRequest {
        request_id: request.id.clone(),
        messages: request.messages.clone(),
        options: request.metadata.request_options.clone(),
        payload_hash,
        is_dirty: request.is_dirty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::tests::MemoryBackend;
    use crate::parity::tests::MemoryLog;
    use promptgate_core::{testing, ParityStatus, Surface};

    fn capturing() -> ModeState {
        ModeState::persistent(PersistentMode::AutoCapturing)
    }

    fn applying() -> ModeState {
        ModeState::persistent(PersistentMode::AutoApplying)
    }

    fn paused(decision: TurnDecision) -> PendingTurnHandle {
        match decision {
            TurnDecision::PauseForReview(handle) => handle,
            other => panic!("expected pause, got {other:?}"),
        }
    }

    /// Runs the capture scenario: select auto, review one turn, edit section 1, resume.
    fn captured(interceptor: &mut Interceptor, key: &InterceptionKey) -> PendingTurnHandle {
        assert_eq!(interceptor.select(key, RequestedMode::Auto).unwrap(), capturing());
        let handle = paused(interceptor.on_turn_start(
            key,
            &testing::conversation(),
            testing::seed("req-1"),
        ));
        interceptor
            .update_section(key, handle.turn, "section-1", "edited question")
            .unwrap();
        interceptor.resume(key).unwrap();
        handle
    }

    #[test]
    fn capture_then_apply_sequence() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        assert_eq!(interceptor.mode(&key), ModeState::OFF);

        let mut handle = captured(&mut interceptor, &key);
        assert_eq!(interceptor.mode(&key), applying());
        assert!(interceptor.pending(&key).is_none());
        let set = interceptor.override_set(&key).expect("override captured");
        assert_eq!(set.edits.len(), 1);
        assert_eq!(set.edits[0].source_message_index, 1);
        match handle.try_resolution() {
            Some(TurnResolution::Resumed(outgoing)) => assert!(outgoing.is_dirty),
            other => panic!("expected resumed turn, got {other:?}"),
        }

        let fresh = testing::turn(4);
        match interceptor.on_turn_start(&key, &fresh, testing::seed("req-2")) {
            TurnDecision::ApplyOverride {
                request,
                report,
                set_name,
            } => {
                assert!(request.is_dirty);
                assert_eq!(report.applied, 1);
                assert!(set_name.starts_with("conv-1@panel "));
                assert_eq!(request.messages.len(), 4);
                assert_eq!(request.messages[1], Message::user("edited question"));
                assert_eq!(request.messages[2..], fresh[2..]);
            }
            other => panic!("expected override, got {other:?}"),
        }
        assert!(interceptor.last_sent(&key).unwrap().is_dirty);
        assert!(interceptor.pending(&key).is_none());
    }

    #[test]
    fn cancel_keeps_override_and_mode() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        captured(&mut interceptor, &key);
        assert_eq!(interceptor.begin_capture(&key).unwrap(), capturing());

        let mut handle = paused(interceptor.on_turn_start(
            &key,
            &testing::turn(3),
            testing::seed("req-2"),
        ));
        assert_eq!(interceptor.cancel(&key).unwrap(), capturing());
        assert_eq!(handle.try_resolution(), Some(TurnResolution::Cancelled));
        assert!(interceptor.pending(&key).is_none());
        assert!(interceptor.override_set(&key).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let mut interceptor = Interceptor::default();
        let panel = testing::key();
        let inline = InterceptionKey::new("conv-1", Surface::Inline);

        interceptor
            .select(&panel, RequestedMode::ReviewAlways)
            .unwrap();
        paused(interceptor.on_turn_start(&panel, &testing::turn(2), testing::seed("a")));

        match interceptor.on_turn_start(&inline, &testing::turn(2), testing::seed("b")) {
            TurnDecision::SendImmediately(outgoing) => assert!(!outgoing.is_dirty),
            other => panic!("expected send, got {other:?}"),
        }
        assert!(interceptor.pending(&panel).is_some());
        assert_eq!(interceptor.mode(&inline), ModeState::OFF);
    }

    #[test]
    fn one_shot_review_restores_prior_without_saving() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        assert_eq!(
            interceptor.request_one_shot_review(&key).unwrap(),
            ModeState::OneShotReview {
                prior: PersistentMode::Off
            }
        );

        let handle = paused(interceptor.on_turn_start(
            &key,
            &testing::conversation(),
            testing::seed("r"),
        ));
        interceptor
            .delete_section(&key, handle.turn, "section-4")
            .unwrap();
        let outgoing = interceptor.resume(&key).unwrap();
        assert_eq!(outgoing.messages.len(), 4);
        assert_eq!(interceptor.mode(&key), ModeState::OFF);
        assert!(interceptor.override_set(&key).is_none());

        match interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("s")) {
            TurnDecision::SendImmediately(_) => {}
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn new_turn_supersedes_pending_review() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.select(&key, RequestedMode::ReviewAlways).unwrap();

        let mut first =
            paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("a")));
        let second =
            paused(interceptor.on_turn_start(&key, &testing::turn(3), testing::seed("b")));

        assert_eq!(first.try_resolution(), Some(TurnResolution::Cancelled));
        let (turn, request) = interceptor.pending(&key).unwrap();
        assert_eq!(turn, second.turn);
        assert_eq!(request.id, "b");
    }

    #[test]
    fn select_off_cancels_pending() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.select(&key, RequestedMode::ReviewAlways).unwrap();
        let mut handle =
            paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("a")));

        assert_eq!(interceptor.select(&key, RequestedMode::Off).unwrap(), ModeState::OFF);
        assert_eq!(handle.try_resolution(), Some(TurnResolution::Cancelled));
        assert!(interceptor.pending(&key).is_none());
    }

    #[test]
    fn invalid_commands_leave_state_untouched() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        let err = interceptor.resume(&key).unwrap_err();
        assert!(matches!(err, InterceptError::InvalidTransition { .. }));
        assert!(interceptor.cancel(&key).is_err());
        assert!(interceptor.begin_capture(&key).is_err());
        assert_eq!(interceptor.mode(&key), ModeState::OFF);
    }

    #[test]
    fn disabling_resets_every_key() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        captured(&mut interceptor, &key);
        interceptor.begin_capture(&key).unwrap();
        let mut handle =
            paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("a")));

        interceptor.set_enabled(false);
        assert_eq!(handle.try_resolution(), Some(TurnResolution::Cancelled));
        assert_eq!(interceptor.mode(&key), ModeState::OFF);
        assert!(interceptor.override_set(&key).is_none());
        assert_eq!(
            interceptor.select(&key, RequestedMode::Auto),
            Err(InterceptError::Disabled)
        );
        assert!(matches!(
            interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("b")),
            TurnDecision::SendImmediately(_)
        ));

        interceptor.set_enabled(true);
        assert_eq!(interceptor.select(&key, RequestedMode::Auto).unwrap(), capturing());
    }

    #[test]
    fn missing_set_falls_back_to_capture() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        captured(&mut interceptor, &key);
        interceptor.overrides.clear(&key);

        paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("a")));
        assert_eq!(interceptor.mode(&key), capturing());
    }

    #[test]
    fn stale_leaf_path_is_reported() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.request_one_shot_review(&key).unwrap();
        let handle = paused(interceptor.on_turn_start(
            &key,
            &testing::conversation(),
            testing::seed("r"),
        ));

        let err = interceptor
            .set_leaf_edit(&key, handle.turn, "section-1", EditPath::Content { index: 1 }, "x")
            .unwrap_err();
        assert!(matches!(err, InterceptError::Edit(_)));

        interceptor
            .set_leaf_edit(&key, handle.turn, "section-1", EditPath::Content { index: 0 }, "x")
            .unwrap();
        let outgoing = interceptor.resume(&key).unwrap();
        assert!(outgoing.is_dirty);
        assert_eq!(outgoing.messages[1].content.len(), 3);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "edit after resolution")]
    fn editing_a_resolved_turn_panics_in_debug() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.request_one_shot_review(&key).unwrap();
        let handle =
            paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("r")));
        interceptor.cancel(&key).unwrap();

        let _ = interceptor.update_section(&key, handle.turn, "section-1", "late");
    }

    #[test]
    fn workspace_default_hydrates_from_backend() {
        let backend = MemoryBackend::default();
        let key = testing::key();
        let settings = InterceptorSettings {
            default_mode: DefaultMode::Auto,
            default_override_scope: ScopeSetting::Workspace,
            ..Default::default()
        };

        let mut first = Interceptor::new(&settings).with_backend(Box::new(backend.clone()));
        let handle =
            paused(first.on_turn_start(&key, &testing::conversation(), testing::seed("a")));
        first
            .update_section(&key, handle.turn, "section-0", "Be terse.")
            .unwrap();
        first.resume(&key).unwrap();
        assert!(backend.rows.borrow().contains_key(&key));

        let mut restarted = Interceptor::new(&settings).with_backend(Box::new(backend));
        assert!(matches!(
            restarted.on_turn_start(&key, &testing::turn(3), testing::seed("b")),
            TurnDecision::ApplyOverride { .. }
        ));
        assert_eq!(restarted.mode(&key), applying());
    }

    fn auto_workspace() -> InterceptorSettings {
        InterceptorSettings {
            default_mode: DefaultMode::Auto,
            default_override_scope: ScopeSetting::Workspace,
            ..Default::default()
        }
    }

    #[test]
    fn untouched_key_reports_applying_when_set_is_persisted() {
        let backend = MemoryBackend::default();
        let key = testing::key();
        let mut first =
            Interceptor::new(&auto_workspace()).with_backend(Box::new(backend.clone()));
        captured(&mut first, &key);

        let restarted =
            Interceptor::new(&auto_workspace()).with_backend(Box::new(backend.clone()));
        assert_eq!(restarted.mode(&key), applying());
        let other = InterceptionKey::new("conv-2", Surface::Panel);
        assert_eq!(restarted.mode(&other), capturing());
    }

    #[test]
    fn disabling_stops_persisted_sets_from_coming_back() {
        let backend = MemoryBackend::default();
        let key = testing::key();
        let mut interceptor =
            Interceptor::new(&auto_workspace()).with_backend(Box::new(backend.clone()));
        captured(&mut interceptor, &key);

        interceptor.set_enabled(false);
        assert!(interceptor.override_set(&key).is_none());
        assert_eq!(interceptor.mode(&key), ModeState::OFF);
        assert!(matches!(
            interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("b")),
            TurnDecision::SendImmediately(outgoing) if !outgoing.is_dirty
        ));
        assert!(interceptor.last_sent(&key).is_none());
        assert!(backend.rows.borrow().contains_key(&key));

        interceptor.set_enabled(true);
        assert_eq!(interceptor.mode(&key), capturing());
        assert_eq!(interceptor.select(&key, RequestedMode::Auto).unwrap(), capturing());
        paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("c")));
    }

    #[test]
    fn resolving_while_disabled_is_rejected() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.request_one_shot_review(&key).unwrap();
        paused(interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("a")));

        interceptor.set_enabled(false);
        assert_eq!(interceptor.resume(&key), Err(InterceptError::Disabled));
        assert_eq!(interceptor.cancel(&key), Err(InterceptError::Disabled));
    }

    #[test]
    fn clearing_override_returns_to_capturing() {
        let backend = MemoryBackend::default();
        let key = testing::key();
        let mut interceptor =
            Interceptor::new(&auto_workspace()).with_backend(Box::new(backend.clone()));
        captured(&mut interceptor, &key);
        assert_eq!(interceptor.mode(&key), applying());

        assert_eq!(interceptor.clear_override(&key).unwrap(), capturing());
        assert!(interceptor.override_set(&key).is_none());
        assert!(backend.rows.borrow().is_empty());

        let handle =
            paused(interceptor.on_turn_start(&key, &testing::turn(3), testing::seed("b")));
        assert_eq!(interceptor.pending(&key).unwrap().0, handle.turn);
        assert_eq!(interceptor.clear_override(&key).unwrap(), capturing());
        assert!(interceptor.pending(&key).is_some());
    }

    #[test]
    fn switching_review_to_auto_keeps_pending_and_saves_on_resume() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.select(&key, RequestedMode::ReviewAlways).unwrap();
        let mut handle = paused(interceptor.on_turn_start(
            &key,
            &testing::conversation(),
            testing::seed("r"),
        ));

        assert_eq!(interceptor.select(&key, RequestedMode::Auto).unwrap(), capturing());
        assert_eq!(handle.try_resolution(), None);
        interceptor
            .update_section(&key, handle.turn, "section-1", "edited question")
            .unwrap();
        interceptor.resume(&key).unwrap();

        assert_eq!(interceptor.mode(&key), applying());
        let set = interceptor.override_set(&key).expect("captured on resume");
        assert_eq!(set.edits.len(), 1);
        assert!(matches!(
            handle.try_resolution(),
            Some(TurnResolution::Resumed(outgoing)) if outgoing.is_dirty
        ));
    }

    #[test]
    fn pending_edits_can_be_undone() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.request_one_shot_review(&key).unwrap();
        let handle = paused(interceptor.on_turn_start(
            &key,
            &testing::conversation(),
            testing::seed("r"),
        ));
        let turn = handle.turn;

        interceptor.delete_section(&key, turn, "section-4").unwrap();
        interceptor.restore_section(&key, turn, "section-4").unwrap();
        interceptor
            .set_leaf_edit(&key, turn, "section-1", EditPath::Content { index: 0 }, "x")
            .unwrap();
        interceptor.clear_leaf_edits(&key, turn, "section-1").unwrap();
        let (_, request) = interceptor.pending(&key).unwrap();
        assert!(request.sections.iter().all(|s| !s.deleted && s.leaf_edits.is_empty()));

        interceptor.update_section(&key, turn, "section-0", "changed").unwrap();
        interceptor.reset_request(&key, turn).unwrap();
        let outgoing = interceptor.resume(&key).unwrap();
        assert!(!outgoing.is_dirty);
        assert_eq!(outgoing.messages, testing::conversation());
    }

    #[tokio::test]
    async fn waiting_sender_receives_edited_payload() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        interceptor.select(&key, RequestedMode::ReviewAlways).unwrap();
        let handle = paused(interceptor.on_turn_start(
            &key,
            &testing::conversation(),
            testing::seed("r"),
        ));
        interceptor
            .update_section(&key, handle.turn, "section-4", "Rewrite it instead.")
            .unwrap();
        let sent = interceptor.resume(&key).unwrap();

        match handle.wait().await {
            TurnResolution::Resumed(outgoing) => {
                assert_eq!(outgoing, sent);
                assert_eq!(outgoing.messages[4], Message::user("Rewrite it instead."));
            }
            TurnResolution::Cancelled => panic!("turn was cancelled"),
        }
        assert_eq!(interceptor.mode(&key).base(), PersistentMode::ReviewAlways);
    }

    #[tokio::test]
    async fn parity_reconciles_last_sent_payload() {
        let mut interceptor = Interceptor::default();
        let key = testing::key();
        let hash = match interceptor.on_turn_start(&key, &testing::turn(2), testing::seed("r")) {
            TurnDecision::SendImmediately(outgoing) => outgoing.payload_hash.expect("hashed"),
            other => panic!("expected send, got {other:?}"),
        };

        let mut log = MemoryLog::default();
        log.hashes.insert("r".to_string(), hash);
        let report = interceptor.reconcile_parity(&key, &log).await.unwrap();
        assert_eq!(report.status, ParityStatus::Match);
        assert_eq!(
            interceptor.last_sent(&key).unwrap().metadata.parity_status,
            ParityStatus::Match
        );

        let other = InterceptionKey::new("conv-2", Surface::Panel);
        assert!(interceptor.reconcile_parity(&other, &log).await.is_none());
    }
}

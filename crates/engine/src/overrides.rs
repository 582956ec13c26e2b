use promptgate_core::{
    ApplyReport, EditableChatRequest, InterceptionKey, OverrideBackend, OverrideScope, OverrideSet,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Active override set per key. Workspace-scoped sets are written through to
/// the backend and hydrated from it on first lookup.
#[derive(Default)]
pub struct OverrideStore {
    sets: HashMap<InterceptionKey, OverrideSet>,
    backend: Option<Box<dyn OverrideBackend>>,
    /// Set by `reset`. Persisted sets are no longer read back after a reset.
    detached: bool,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: Box<dyn OverrideBackend>) -> Self {
        Self {
            sets: HashMap::new(),
            backend: Some(backend),
            detached: false,
        }
    }

    pub fn get(&mut self, key: &InterceptionKey) -> Option<&OverrideSet> {
        if !self.sets.contains_key(key) {
            if let Some(set) = self.load_persisted(key) {
                debug!("Hydrated override set {} for {}", set.name, key);
                self.sets.insert(key.clone(), set);
            }
        }
        self.sets.get(key)
    }

    pub fn contains(&mut self, key: &InterceptionKey) -> bool {
        self.get(key).is_some()
    }

    /// Like `contains`, without caching what the backend returns.
    pub fn peek(&self, key: &InterceptionKey) -> bool {
        self.sets.contains_key(key) || self.load_persisted(key).is_some()
    }

    /// Replace the set for this key with the edits carried by `request`.
    pub fn capture(
        &mut self,
        key: &InterceptionKey,
        scope: OverrideScope,
        request: &EditableChatRequest,
    ) -> &OverrideSet {
        let set = OverrideSet::capture(key, scope, &request.id, &request.sections);
        info!(
            "Captured override set {} for {} ({} edits, {} scope)",
            set.name,
            key,
            set.edits.len(),
            scope.as_str()
        );

        if let Some(backend) = &self.backend {
            let persisted = match scope {
                OverrideScope::Workspace => backend.save(&set),
                OverrideScope::Session => backend.remove(key),
            };
            if let Err(e) = persisted {
                warn!("Failed to persist override set for {key}: {e}");
            }
        }

        match self.sets.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                slot.insert(set);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(set),
        }
    }

    /// Merge the stored edits into a freshly built request and recompute it.
    pub fn apply(
        &mut self,
        key: &InterceptionKey,
        request: &mut EditableChatRequest,
    ) -> Option<ApplyReport> {
        let set = self.get(key)?;
        let report = set.apply_to(&mut request.sections, &request.original_messages);
        request.recompute_messages();

        for skipped in &report.skipped {
            warn!(
                "Override for {} skipped at message {}: {}",
                key, skipped.source_message_index, skipped.reason
            );
        }
        info!(
            "Applied override set {} to {} ({} applied, {} skipped)",
            set.name,
            request.id,
            report.applied,
            report.skipped.len()
        );
        Some(report)
    }

    /// Remove the set for this key. Returns true when one existed.
    pub fn clear(&mut self, key: &InterceptionKey) -> bool {
        let existed = self.contains(key);
        self.sets.remove(key);
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.remove(key) {
                warn!("Failed to remove persisted override set for {key}: {e}");
            }
        }
        if existed {
            info!("Cleared override set for {key}");
        }
        existed
    }

    /// Drop every set and stop hydrating from the backend. Rows already
    /// persisted stay on disk for the next process.
    pub fn reset(&mut self) {
        self.sets.clear();
        self.detached = true;
    }

    fn load_persisted(&self, key: &InterceptionKey) -> Option<OverrideSet> {
        if self.detached {
            return None;
        }
        let backend = self.backend.as_ref()?;
        match backend.load(key) {
            Ok(set) => set,
            Err(e) => {
                warn!("Failed to load override set for {key}: {e}");
                None
            }
        }
    }
}

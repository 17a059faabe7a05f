//! In-memory session runtimes and tab bindings (§3, §4.5, §4.6.8).
//!
//! Both tables are guarded by their own `std::sync::Mutex`; no nested
//! locking occurs across the runtime table, the tab-binding set, and the
//! `BranchRegistry`'s reservation set.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use docs_agents::LlmClient;
use tokio_util::sync::CancellationToken;

use crate::types::{ProjectId, ProviderKind, SessionInfo, SessionKey};

/// Bound to a `SessionKey`. Owns the LLM client handle, its model/provider
/// identity, the last-bound target branch, and the cancellation token for
/// whatever stream is currently running (if any).
pub struct SessionRuntime {
    pub client: Box<dyn LlmClient>,
    pub model_key: String,
    pub model_display: String,
    pub provider: ProviderKind,
    pub provider_label: String,
    pub target_branch: String,
    pub cancellation: Option<CancellationToken>,
}

impl SessionRuntime {
    pub fn is_running(&self) -> bool {
        self.client.is_running()
    }
}

/// Flat `HashMap<SessionKey, SessionRuntime>` behind a mutex (§9: cyclic
/// session/runtime/client references are modeled this way rather than with
/// back-pointers). At most one runtime is ever registered under a key;
/// callers must `take` and stop the outgoing runtime's stream before
/// `insert`ing its replacement.
#[derive(Default)]
pub struct SessionRuntimeTable {
    runtimes: Mutex<HashMap<SessionKey, SessionRuntime>>,
}

impl SessionRuntimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the runtime under `key`, if any. The caller owns
    /// stopping its stream (an async operation) before it is dropped or a
    /// replacement is installed.
    pub fn take(&self, key: &SessionKey) -> Option<SessionRuntime> {
        let mut guard = self.runtimes.lock().expect("session runtime table mutex poisoned");
        guard.remove(key)
    }

    pub fn insert(&self, key: SessionKey, runtime: SessionRuntime) {
        let mut guard = self.runtimes.lock().expect("session runtime table mutex poisoned");
        guard.insert(key, runtime);
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        let guard = self.runtimes.lock().expect("session runtime table mutex poisoned");
        guard.contains_key(key)
    }

    /// Lists a `SessionInfo` snapshot for every live runtime scoped to
    /// `project_id`, annotated with its tab-bound flag.
    pub fn list_for_project(&self, project_id: &ProjectId, tab_bindings: &TabBindings) -> Vec<SessionInfo> {
        let guard = self.runtimes.lock().expect("session runtime table mutex poisoned");
        let prefix = format!("{}:", project_id.0);
        guard
            .iter()
            .filter(|(key, _)| key.0.starts_with(&prefix))
            .map(|(key, runtime)| SessionInfo {
                session_key: key.clone(),
                project_id: project_id.clone(),
                source_branch: key.0.splitn(2, ':').nth(1).unwrap_or_default().to_string(),
                target_branch: runtime.target_branch.clone(),
                model_key: runtime.model_key.clone(),
                provider: runtime.provider,
                tab_bound: tab_bindings.is_bound(key),
                running: runtime.is_running(),
            })
            .collect()
    }
}

/// Cancellation tokens for streams currently mid-turn, keyed by session.
/// Kept separate from [`SessionRuntimeTable`] because a running turn owns
/// its `SessionRuntime` locally (the client needs `&mut` access across
/// `.await` points) rather than leaving it sitting in the shared table;
/// `stop_stream` still needs somewhere to reach a live token from another
/// task, which is what this registry is for.
#[derive(Default)]
pub struct ActiveStreams {
    tokens: Mutex<HashMap<SessionKey, CancellationToken>>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: SessionKey, token: CancellationToken) {
        let mut guard = self.tokens.lock().expect("active streams mutex poisoned");
        guard.insert(key, token);
    }

    pub fn clear(&self, key: &SessionKey) {
        let mut guard = self.tokens.lock().expect("active streams mutex poisoned");
        guard.remove(key);
    }

    /// Cancels the token registered for `key`, if any is currently active.
    /// Returns whether a live stream was found to cancel.
    pub fn cancel(&self, key: &SessionKey) -> bool {
        let guard = self.tokens.lock().expect("active streams mutex poisoned");
        match guard.get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// The set of session keys currently owned by an interactive UI tab.
/// Unbound sessions keep running as background work and can be re-adopted.
#[derive(Default)]
pub struct TabBindings {
    bound: Mutex<HashSet<SessionKey>>,
}

impl TabBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, key: SessionKey) {
        let mut guard = self.bound.lock().expect("tab bindings mutex poisoned");
        guard.insert(key);
    }

    pub fn unbind(&self, key: &SessionKey) {
        let mut guard = self.bound.lock().expect("tab bindings mutex poisoned");
        guard.remove(key);
    }

    pub fn is_bound(&self, key: &SessionKey) -> bool {
        let guard = self.bound.lock().expect("tab bindings mutex poisoned");
        guard.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_bindings_bind_and_unbind_round_trip() {
        let bindings = TabBindings::new();
        let key = SessionKey("p1:feature/x".to_string());
        assert!(!bindings.is_bound(&key));
        bindings.bind(key.clone());
        assert!(bindings.is_bound(&key));
        bindings.unbind(&key);
        assert!(!bindings.is_bound(&key));
    }

    #[test]
    fn runtime_table_take_removes_entry() {
        let table = SessionRuntimeTable::new();
        let key = SessionKey("p1:feature/x".to_string());
        assert!(!table.contains(&key));
        assert!(table.take(&key).is_none());
    }

    #[test]
    fn active_streams_cancel_is_false_when_nothing_registered() {
        let streams = ActiveStreams::new();
        let key = SessionKey("p1:feature/x".to_string());
        assert!(!streams.cancel(&key));
    }

    #[test]
    fn active_streams_cancel_cancels_the_registered_token() {
        let streams = ActiveStreams::new();
        let key = SessionKey("p1:feature/x".to_string());
        let token = CancellationToken::new();
        streams.register(key.clone(), token.clone());

        assert!(streams.cancel(&key));
        assert!(token.is_cancelled());

        streams.clear(&key);
        assert!(!streams.cancel(&key));
    }
}

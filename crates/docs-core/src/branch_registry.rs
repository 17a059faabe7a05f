//! Process-wide reservation of in-progress docs-branch names (§4.1).

use std::collections::HashSet;
use std::sync::Mutex;

use docs_git::{GitCli, RepoHandle};

use crate::error::OrchestratorError;

const ALTERNATIVE_SUFFIX_CEILING: usize = 100;

/// Guarded by a single `std::sync::Mutex`, not `tokio::sync::Mutex`: the
/// check-and-insert reservation is synchronous and never holds the lock
/// across an `.await`.
#[derive(Debug, Default)]
pub struct BranchRegistry {
    in_progress: Mutex<HashSet<String>>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `name` for the duration of a write operation. Returns
    /// `DocsGenerationInProgress` if another operation already holds it.
    pub fn reserve(&self, name: &str) -> Result<(), OrchestratorError> {
        let mut guard = self.in_progress.lock().expect("branch registry mutex poisoned");
        if !guard.insert(name.to_string()) {
            return Err(OrchestratorError::DocsGenerationInProgress {
                name: name.to_string(),
                suggested: None,
            });
        }
        Ok(())
    }

    /// Idempotent: releasing a name that is not reserved is a no-op.
    pub fn release(&self, name: &str) {
        let mut guard = self.in_progress.lock().expect("branch registry mutex poisoned");
        guard.remove(name);
    }

    pub fn is_in_progress(&self, name: &str) -> bool {
        let guard = self.in_progress.lock().expect("branch registry mutex poisoned");
        guard.contains(name)
    }

    /// Iterates `"{base}-2"`, `"{base}-3"`, … up to a ceiling of 100,
    /// returning the first name that is neither in-progress nor already a
    /// ref in `repo`.
    pub fn suggest_alternative(
        &self,
        repo: &RepoHandle,
        git: &GitCli,
        base_name: &str,
    ) -> Result<String, OrchestratorError> {
        for suffix in 2..=ALTERNATIVE_SUFFIX_CEILING {
            let candidate = format!("{base_name}-{suffix}");
            if self.is_in_progress(&candidate) {
                continue;
            }
            if ref_exists(repo, git, &candidate) {
                continue;
            }
            return Ok(candidate);
        }
        Err(OrchestratorError::Exhausted {
            base: base_name.to_string(),
        })
    }

    /// Decides whether a (project, source, target) branch pair may proceed,
    /// given whether a persisted session already exists for that pair and
    /// whether its runtime is currently bound to a UI tab. The actual
    /// SessionStore/tab-binding lookups are the orchestrator's job; this is
    /// the pure acceptance rule.
    pub fn validate_branch_pair(
        &self,
        source: &str,
        target: &str,
        existing_session_is_tab_bound: bool,
    ) -> Result<(), OrchestratorError> {
        if existing_session_is_tab_bound {
            return Err(OrchestratorError::SessionAlreadyInTab {
                source: source.to_string(),
                target: target.to_string(),
            });
        }
        Ok(())
    }
}

fn ref_exists(repo: &RepoHandle, git: &GitCli, branch: &str) -> bool {
    let refname = format!("refs/heads/{branch}");
    git.run(&repo.root, ["show-ref", "--verify", "--quiet", &refname])
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_rejects_duplicate_reservations() {
        let registry = BranchRegistry::new();
        registry.reserve("docs/feature-x").expect("first reserve");
        let err = registry.reserve("docs/feature-x").unwrap_err();
        assert!(matches!(err, OrchestratorError::DocsGenerationInProgress { .. }));
    }

    #[test]
    fn release_is_idempotent_and_frees_the_name() {
        let registry = BranchRegistry::new();
        registry.reserve("docs/feature-x").expect("reserve");
        registry.release("docs/feature-x");
        registry.release("docs/feature-x");
        assert!(!registry.is_in_progress("docs/feature-x"));
        registry.reserve("docs/feature-x").expect("reserve again");
    }

    #[test]
    fn validate_branch_pair_rejects_when_tab_bound() {
        let registry = BranchRegistry::new();
        let err = registry
            .validate_branch_pair("feature/x", "main", true)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SessionAlreadyInTab { .. }));
        registry.validate_branch_pair("feature/x", "main", false).expect("accepted");
    }
}

//! Domain types shared across the docs orchestrator crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a project registered with the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical session identifier `"{projectId}:{sourceBranch}"`, or an
/// opaque caller-supplied override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// Builds the canonical key for a (project, source branch) pair.
    pub fn canonical(project_id: &ProjectId, source_branch: &str) -> Self {
        Self(format!("{}:{}", project_id.0, source_branch))
    }

    /// Uses a caller-supplied override if present, else the canonical key.
    pub fn resolve(project_id: &ProjectId, source_branch: &str, override_key: Option<&str>) -> Self {
        match override_key {
            Some(key) if !key.trim().is_empty() => Self(key.trim().to_string()),
            _ => Self::canonical(project_id, source_branch),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A project the orchestrator can generate documentation for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub code_root: std::path::PathBuf,
    pub docs_root: std::path::PathBuf,
    /// Branch docs are cut from when `docs_root != code_root`.
    pub documentation_base_branch: Option<String>,
}

impl Project {
    /// Configured-path equality check, used before either root has been
    /// resolved against Git (e.g. to validate a project entry at config
    /// load time). This does *not* resolve `.` components, symlinks, or
    /// two distinct configured paths that land inside the same repo; the
    /// orchestrator's own preamble determines the authoritative
    /// shared-with-code flag from each root's discovered Git toplevel
    /// instead of calling this method.
    pub fn shared_with_code(&self) -> bool {
        self.docs_root == self.code_root
    }
}

/// The LLM provider backing a [`ModelKind`]-tagged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        };
        write!(f, "{label}")
    }
}

/// One changed file as reported by [`DocGenerationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// Result returned by every operation that produces or restores a docs
/// generation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocGenerationResult {
    pub source_branch: String,
    pub target_branch: String,
    pub docs_branch: String,
    pub docs_in_code_repo: bool,
    pub files: Vec<ChangedFile>,
    pub diff: String,
    pub summary: Option<String>,
}

/// Lightweight view of a live session, used by `get_available_tab_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_key: SessionKey,
    pub project_id: ProjectId,
    pub source_branch: String,
    pub target_branch: String,
    pub model_key: String,
    pub provider: ProviderKind,
    pub tab_bound: bool,
    pub running: bool,
}

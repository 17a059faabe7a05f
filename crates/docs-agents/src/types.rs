use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The set of LLM providers an `LlmClient` implementation may speak for.
///
/// Mirrors `docs_core::types::ProviderKind` field-for-field; duplicated here
/// rather than imported so this crate stays a leaf (`docs-core` depends on
/// `docs-agents`, not the other way around).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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
        f.write_str(label)
    }
}

/// Identifies a model within a provider (e.g. `"gpt-5"`, `"claude-opus-4"`)
/// alongside the human-facing labels a session needs to report itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_key: String,
    pub model_display: String,
    pub provider: ProviderKind,
    pub provider_label: String,
}

/// Provider-specific configuration (API keys, base URLs, sampling
/// parameters). Never inspected by the orchestrator; passed through opaque
/// to whichever client implementation constructs itself from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOptions {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub extra: std::collections::BTreeMap<String, String>,
}

/// Opaque, round-tripped conversation state. The orchestrator persists this
/// blob and restores it verbatim; only the owning `LlmClient` implementation
/// ever parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory(pub String);

impl ConversationHistory {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single changed file the agent reports touching, prior to `ObjectTransfer`
/// independently observing the working tree via `git status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFileNote {
    pub path: String,
    pub note: String,
}

/// Arguments for a `generate_docs` agent turn (SPEC_FULL §4.6.1 step 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateDocsRequest {
    pub project_name: String,
    pub code_root: std::path::PathBuf,
    pub docs_workspace_path: std::path::PathBuf,
    pub docs_relative_path: std::path::PathBuf,
    pub source_branch: String,
    pub target_branch: String,
    pub source_commit: String,
    pub scoped_diff: String,
    pub changed_files: Vec<String>,
    pub user_instructions: String,
}

/// Arguments for a `doc_refine` agent turn (SPEC_FULL §4.6.2/§4.6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRefineRequest {
    pub project_name: String,
    pub docs_workspace_path: std::path::PathBuf,
    pub docs_relative_path: std::path::PathBuf,
    pub instruction: String,
}

/// What an agent turn reports back, independent of the working-tree state
/// `ObjectTransfer` inspects on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurnOutcome {
    pub summary: Option<String>,
    pub notes: Vec<AgentFileNote>,
    pub completed_at: DateTime<Utc>,
}

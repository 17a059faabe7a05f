use docs_agents::AgentError;
use docs_git::GitError;

/// Top-level error surfaced by every `Orchestrator` operation. Recovers
/// nothing internally: every variant carries enough context for the caller
/// to decide whether to retry, rename, delete, or cancel.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("not configured: {message}")]
    NotConfigured { message: String },

    #[error("repository not found: {path}")]
    RepoNotFound { path: String },

    #[error("{path} is not a git repository")]
    NotAGitRepo { path: String },

    #[error("branch not found: {branch}")]
    BranchNotFound { branch: String },

    #[error("stale session for {project_id}:{source}")]
    StaleSession { project_id: String, source: String },

    #[error("docs branch {name} already exists")]
    DocsBranchExists { name: String, suggested: Option<String> },

    #[error("docs generation already in progress on {name}")]
    DocsGenerationInProgress { name: String, suggested: Option<String> },

    #[error("session {source}:{target} is bound to another tab")]
    SessionAlreadyInTab { source: String, target: String },

    #[error("source branch has uncommitted changes")]
    UncommittedChangesOnSourceBranch,

    #[error("operation cancelled")]
    Cancelled,

    #[error("llm client failure: {message}")]
    LlmFailure { message: String },

    #[error("git operation failure: {message}")]
    GitFailure { message: String },

    #[error("exhausted alternative names for {base}")]
    Exhausted { base: String },

    #[error("project not registered: {id}")]
    ProjectNotFound { id: String },

    #[error("session store failure: {message}")]
    PersistenceFailure { message: String },
}

impl From<GitError> for OrchestratorError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::NotARepository { path } => OrchestratorError::NotAGitRepo {
                path: path.display().to_string(),
            },
            other => OrchestratorError::GitFailure {
                message: other.to_string(),
            },
        }
    }
}

impl From<crate::store::PersistenceError> for OrchestratorError {
    fn from(err: crate::store::PersistenceError) -> Self {
        OrchestratorError::PersistenceFailure {
            message: err.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for OrchestratorError {
    fn from(err: crate::config::ConfigError) -> Self {
        match err {
            crate::config::ConfigError::ProjectNotFound(id) => OrchestratorError::ProjectNotFound { id },
            other => OrchestratorError::NotConfigured {
                message: other.to_string(),
            },
        }
    }
}

impl From<crate::validation::InvalidInput> for OrchestratorError {
    fn from(err: crate::validation::InvalidInput) -> Self {
        OrchestratorError::InvalidInput { message: err.0 }
    }
}

impl From<AgentError> for OrchestratorError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Cancelled => OrchestratorError::Cancelled,
            other => OrchestratorError::LlmFailure {
                message: other.to_string(),
            },
        }
    }
}

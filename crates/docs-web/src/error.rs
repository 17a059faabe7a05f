use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docs_core::error::OrchestratorError;
use serde::Serialize;

/// The orchestrator's typed errors, reshaped into an HTTP status plus a
/// `{code, message, suggested}` JSON body callers can branch on (§7:
/// "enough context for the caller to decide").
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("{message}")]
    BadRequest { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Gone { message: String },
    #[error("{message}")]
    Conflict { message: String, suggested: Option<String> },
    #[error("{message}")]
    BadGateway { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl From<OrchestratorError> for WebError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidInput { message } => WebError::BadRequest { message },
            OrchestratorError::NotConfigured { message } => WebError::Conflict {
                message,
                suggested: None,
            },
            OrchestratorError::RepoNotFound { path } => WebError::NotFound {
                message: format!("repository not found: {path}"),
            },
            OrchestratorError::NotAGitRepo { path } => WebError::BadRequest {
                message: format!("{path} is not a git repository"),
            },
            OrchestratorError::BranchNotFound { branch } => WebError::NotFound {
                message: format!("branch not found: {branch}"),
            },
            OrchestratorError::StaleSession { project_id, source } => WebError::Gone {
                message: format!("stale session for {project_id}:{source}"),
            },
            OrchestratorError::DocsBranchExists { name, suggested } => WebError::Conflict {
                message: format!("docs branch {name} already exists"),
                suggested,
            },
            OrchestratorError::DocsGenerationInProgress { name, suggested } => WebError::Conflict {
                message: format!("docs generation already in progress on {name}"),
                suggested,
            },
            OrchestratorError::SessionAlreadyInTab { source, target } => WebError::Conflict {
                message: format!("session {source}:{target} is bound to another tab"),
                suggested: None,
            },
            OrchestratorError::UncommittedChangesOnSourceBranch => WebError::Conflict {
                message: "source branch has uncommitted changes".to_string(),
                suggested: None,
            },
            OrchestratorError::Cancelled => WebError::Conflict {
                message: "operation cancelled".to_string(),
                suggested: None,
            },
            OrchestratorError::LlmFailure { message } => WebError::BadGateway { message },
            OrchestratorError::GitFailure { message } => WebError::BadGateway { message },
            OrchestratorError::Exhausted { base } => WebError::Conflict {
                message: format!("exhausted alternative names for {base}"),
                suggested: None,
            },
            OrchestratorError::ProjectNotFound { id } => WebError::NotFound {
                message: format!("project not registered: {id}"),
            },
            OrchestratorError::PersistenceFailure { message } => WebError::Internal { message },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested: Option<String>,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code, suggested) = match &self {
            WebError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request", None),
            WebError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", None),
            WebError::Gone { .. } => (StatusCode::GONE, "stale_session", None),
            WebError::Conflict { suggested, .. } => (StatusCode::CONFLICT, "conflict", suggested.clone()),
            WebError::BadGateway { .. } => (StatusCode::BAD_GATEWAY, "upstream_failure", None),
            WebError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        };
        let body = ErrorBody {
            code,
            message: self.to_string(),
            suggested,
        };
        (status, Json(body)).into_response()
    }
}

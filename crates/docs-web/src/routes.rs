use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use docs_core::types::{DocGenerationResult, ProjectId, SessionInfo};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::WebError;
use crate::model::{
    CommitDocsBody, EventsQuery, GenerateDocsBody, GenerateDocsFromBranchBody, MergeDocsBody, OkResponse,
    RefineDocsBody, ResolveDeleteBody, ResolveRenameBody, ResolveRenameResponse, StopStreamBody, TabBody,
    ValidateBranchPairBody,
};
use crate::state::WebState;

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/projects/{project_id}/generate-docs", post(generate_docs))
        .route(
            "/projects/{project_id}/generate-docs-from-branch",
            post(generate_docs_from_branch),
        )
        .route("/projects/{project_id}/refine-docs", post(refine_docs))
        .route("/projects/{project_id}/commit-docs", post(commit_docs))
        .route(
            "/projects/{project_id}/merge-docs-into-source",
            post(merge_docs_into_source),
        )
        .route(
            "/projects/{project_id}/sessions/{source}/{target}",
            get(load_generation_session),
        )
        .route("/projects/{project_id}/stop-stream", post(stop_stream))
        .route("/projects/{project_id}/bind-tab", post(bind_tab))
        .route("/projects/{project_id}/unbind-tab", post(unbind_tab))
        .route("/projects/{project_id}/tab-sessions", get(tab_sessions))
        .route(
            "/projects/{project_id}/validate-branch-pair",
            post(validate_branch_pair),
        )
        .route(
            "/projects/{project_id}/resolve-conflict/delete",
            post(resolve_conflict_delete),
        )
        .route(
            "/projects/{project_id}/resolve-conflict/rename",
            post(resolve_conflict_rename),
        )
        .route("/projects/{project_id}/events", get(stream_events))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn generate_docs(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<GenerateDocsBody>,
) -> Result<Json<DocGenerationResult>, WebError> {
    let project_id = ProjectId::new(project_id);
    let result = state
        .orchestrator
        .generate_docs(
            &project_id,
            &body.source_branch,
            &body.target_branch,
            &body.model_key,
            &body.user_instructions,
            body.docs_branch_override.as_deref(),
            body.session_key.as_deref(),
        )
        .await?;
    Ok(Json(result))
}

async fn generate_docs_from_branch(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<GenerateDocsFromBranchBody>,
) -> Result<Json<DocGenerationResult>, WebError> {
    let project_id = ProjectId::new(project_id);
    let result = state
        .orchestrator
        .generate_docs_from_branch(
            &project_id,
            &body.branch,
            &body.model_key,
            &body.instructions,
            body.docs_branch_override.as_deref(),
            body.session_key.as_deref(),
        )
        .await?;
    Ok(Json(result))
}

async fn refine_docs(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<RefineDocsBody>,
) -> Result<Json<DocGenerationResult>, WebError> {
    let project_id = ProjectId::new(project_id);
    let result = state
        .orchestrator
        .refine_docs(&project_id, &body.source_branch, &body.instruction, body.session_key.as_deref())
        .await?;
    Ok(Json(result))
}

async fn commit_docs(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<CommitDocsBody>,
) -> Result<Json<DocGenerationResult>, WebError> {
    let project_id = ProjectId::new(project_id);
    let result = state.orchestrator.commit_docs(&project_id, &body.branch, &body.files)?;
    Ok(Json(result))
}

async fn merge_docs_into_source(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<MergeDocsBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state.orchestrator.merge_docs_into_source(&project_id, &body.source_branch)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn load_generation_session(
    State(state): State<WebState>,
    Path((project_id, source, target)): Path<(String, String, String)>,
) -> Result<Json<DocGenerationResult>, WebError> {
    let project_id = ProjectId::new(project_id);
    let result = state.orchestrator.load_generation_session(&project_id, &source, &target)?;
    Ok(Json(result))
}

async fn stop_stream(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<StopStreamBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state
        .orchestrator
        .stop_stream(&project_id, &body.source_branch, body.session_key.as_deref())
        .await;
    Ok(Json(OkResponse { ok: true }))
}

async fn bind_tab(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<TabBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state.orchestrator.bind_session_to_tab(&project_id, &body.source_branch);
    Ok(Json(OkResponse { ok: true }))
}

async fn unbind_tab(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<TabBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state.orchestrator.unbind_session_from_tab(&project_id, &body.source_branch);
    Ok(Json(OkResponse { ok: true }))
}

async fn tab_sessions(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<SessionInfo>>, WebError> {
    let project_id = ProjectId::new(project_id);
    Ok(Json(state.orchestrator.get_available_tab_sessions(&project_id)))
}

async fn validate_branch_pair(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<ValidateBranchPairBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state
        .orchestrator
        .validate_branch_pair(&project_id, &body.source_branch, &body.target_branch)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn resolve_conflict_delete(
    State(state): State<WebState>,
    Path(project_id): Path<String>,
    Json(body): Json<ResolveDeleteBody>,
) -> Result<Json<OkResponse>, WebError> {
    let project_id = ProjectId::new(project_id);
    state.orchestrator.resolve_by_delete(&project_id, &body.source_branch)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn resolve_conflict_rename(
    State(state): State<WebState>,
    Path(_project_id): Path<String>,
    Json(body): Json<ResolveRenameBody>,
) -> Result<Json<ResolveRenameResponse>, WebError> {
    let docs_branch_override = state.orchestrator.resolve_by_rename(&body.new_docs_branch)?;
    Ok(Json(ResolveRenameResponse { docs_branch_override }))
}

async fn stream_events(
    State(state): State<WebState>,
    Path(_project_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.orchestrator.events().subscribe();
    let filter_key = query.session_key;
    let stream = BroadcastStream::new(rx).filter_map(move |message| match message {
        Ok(event) => {
            if let Some(key) = &filter_key {
                if &event.session_key.0 != key {
                    return None;
                }
            }
            let kind = format!("{:?}", event.kind).to_lowercase();
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Some(Ok::<SseEvent, Infallible>(SseEvent::default().event(kind).data(data)))
        }
        Err(_) => Some(Ok(SseEvent::default().event("lagged").data("{}"))),
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("keepalive"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::process::Command;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use docs_core::config::OrgConfig;
    use docs_core::orchestrator::Orchestrator;
    use docs_core::store::{SessionStore, SqliteSessionStore};
    use docs_core::types::{DocGenerationResult, Project, ProjectId};
    use tower::ServiceExt;

    use super::router;
    use crate::state::WebState;

    fn unique_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docs-web-routes-{prefix}-{}", uuid::Uuid::new_v4().simple()))
    }

    fn run_git(cwd: &std::path::Path, args: &[&str]) {
        let output = Command::new("git").args(args).current_dir(cwd).output().expect("spawn git");
        assert!(output.status.success(), "git {:?} failed: {}", args, String::from_utf8_lossy(&output.stderr));
    }

    fn init_repo() -> PathBuf {
        let root = unique_dir("shared");
        std::fs::create_dir_all(&root).unwrap();
        run_git(&root, &["init", "-q", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        std::fs::write(root.join("src.txt"), "v1\n").unwrap();
        run_git(&root, &["add", "."]);
        run_git(&root, &["commit", "-q", "-m", "init"]);
        run_git(&root, &["checkout", "-q", "-b", "feature/x"]);
        std::fs::write(root.join("src.txt"), "v2\n").unwrap();
        run_git(&root, &["commit", "-q", "-am", "change src"]);
        run_git(&root, &["checkout", "-q", "main"]);
        root
    }

    fn state_for(root: &PathBuf) -> WebState {
        let mut config = OrgConfig::default();
        config.upsert_project(Project {
            id: ProjectId::new("p1"),
            name: "demo".to_string(),
            code_root: root.clone(),
            docs_root: root.clone(),
            documentation_base_branch: None,
        });
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        WebState::new(Arc::new(Orchestrator::new(config, store)))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok_true() {
        let root = init_repo();
        let app = router(state_for(&root));
        let response = app
            .oneshot(Request::builder().uri("/health").method("GET").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["ok"], true);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn generate_docs_route_returns_a_doc_generation_result() {
        let root = init_repo();
        let app = router(state_for(&root));

        let body = serde_json::json!({
            "source_branch": "feature/x",
            "target_branch": "main",
            "model_key": "openai|gpt-5",
            "user_instructions": "",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/projects/p1/generate-docs")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let result: DocGenerationResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result.docs_branch, "docs/feature/x");

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn generate_docs_route_reports_branch_not_found_as_404() {
        let root = init_repo();
        let app = router(state_for(&root));

        let body = serde_json::json!({
            "source_branch": "does-not-exist",
            "target_branch": "main",
            "model_key": "openai|gpt-5",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/projects/p1/generate-docs")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let root = init_repo();
        let app = router(state_for(&root));
        let response = app
            .oneshot(Request::builder().uri("/missing").method("GET").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        std::fs::remove_dir_all(root).ok();
    }
}

//! The `LlmClient` trait boundary (SPEC_FULL §9): a single dynamic
//! entry-point across providers, represented as `Box<dyn LlmClient>`.
//!
//! This crate defines and exercises the boundary. It does not speak to a
//! real OpenAI/Anthropic/Gemini API — that transport is explicitly out of
//! scope here. [`StubLlmClient`] stands in for it in tests and for any
//! caller that has not yet wired a real provider.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::types::{
    AgentTurnOutcome, ConversationHistory, DocRefineRequest, GenerateDocsRequest, ModelMetadata,
    ProviderOptions,
};

const SUMMARY_FILE_NAME: &str = "docs-summary.md";

/// Writes a fresh summary file into the workspace. Stands in for a real
/// provider's tool-driven file edits: this crate does not implement tool
/// execution, but a stub still needs to produce a working-tree change for
/// `ObjectTransfer` to carry into the canonical docs repo.
fn write_summary_file(workspace_path: &Path, content: &str) -> Result<(), AgentError> {
    std::fs::create_dir_all(workspace_path).map_err(|source| AgentError::Runtime {
        message: format!("failed to prepare docs workspace: {source}"),
    })?;
    std::fs::write(workspace_path.join(SUMMARY_FILE_NAME), format!("{content}\n")).map_err(|source| {
        AgentError::Runtime {
            message: format!("failed to write summary file: {source}"),
        }
    })
}

fn append_summary_file(workspace_path: &Path, content: &str) -> Result<(), AgentError> {
    use std::io::Write;

    std::fs::create_dir_all(workspace_path).map_err(|source| AgentError::Runtime {
        message: format!("failed to prepare docs workspace: {source}"),
    })?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(workspace_path.join(SUMMARY_FILE_NAME))
        .map_err(|source| AgentError::Runtime {
            message: format!("failed to open summary file: {source}"),
        })?;
    writeln!(file, "{content}").map_err(|source| AgentError::Runtime {
        message: format!("failed to append to summary file: {source}"),
    })
}

/// Capability set a session runtime drives a provider through: one agent
/// turn at a time, a cancellable stream context, and an opaque
/// conversation-history blob it can dump and later reload.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_metadata(&self) -> &ModelMetadata;

    async fn generate_docs(
        &mut self,
        request: GenerateDocsRequest,
    ) -> Result<AgentTurnOutcome, AgentError>;

    async fn doc_refine(
        &mut self,
        request: DocRefineRequest,
    ) -> Result<AgentTurnOutcome, AgentError>;

    /// Binds a cancellable context to the in-flight (or about-to-start)
    /// stream. Implementations should store the token and poll it between
    /// suspension points so `stop_stream` can unwind promptly.
    async fn start_stream(&mut self, cancellation: CancellationToken) -> Result<(), AgentError>;

    /// Idempotent: calling this with no stream running is a no-op.
    async fn stop_stream(&mut self);

    fn conversation_history(&self) -> ConversationHistory;

    fn load_conversation_history(&mut self, history: ConversationHistory) -> Result<(), AgentError>;

    fn has_conversation_history(&self) -> bool;

    fn is_running(&self) -> bool;
}

/// Constructs the client for a model/provider pair. Always returns a
/// [`StubLlmClient`] today; a real implementation would match on
/// `metadata.provider` and dispatch to a per-provider struct.
pub fn build_client(metadata: ModelMetadata, options: ProviderOptions) -> Box<dyn LlmClient> {
    Box::new(StubLlmClient::new(metadata, options))
}

/// A deterministic, in-memory stand-in for a real provider client. Records
/// each turn as a line of its conversation log instead of calling out to a
/// network API; the only filesystem touch it makes is writing/appending the
/// summary file a real provider's tool-driven edits would otherwise produce
/// (tool execution itself is a separate boundary this crate does not
/// implement).
#[derive(Debug, Clone)]
pub struct StubLlmClient {
    metadata: ModelMetadata,
    options: ProviderOptions,
    turns: Vec<String>,
    cancellation: Option<CancellationToken>,
    running: bool,
}

impl StubLlmClient {
    pub fn new(metadata: ModelMetadata, options: ProviderOptions) -> Self {
        Self {
            metadata,
            options,
            turns: Vec::new(),
            cancellation: None,
            running: false,
        }
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    fn record_turn(&mut self, line: String) {
        self.turns.push(line);
    }

    fn check_cancelled(&self) -> Result<(), AgentError> {
        if let Some(token) = &self.cancellation {
            if token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    fn model_metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_docs(
        &mut self,
        request: GenerateDocsRequest,
    ) -> Result<AgentTurnOutcome, AgentError> {
        self.check_cancelled()?;
        if request.source_branch.trim().is_empty() {
            return Err(AgentError::InvalidRequest {
                message: "source_branch must not be empty".to_string(),
            });
        }
        let summary = format!(
            "Generated docs for {} against {} ({} file(s) in scope)",
            request.source_branch,
            request.target_branch,
            request.changed_files.len()
        );
        write_summary_file(&request.docs_workspace_path, &summary)?;
        self.record_turn(format!("generate_docs: {summary}"));
        self.running = false;
        Ok(AgentTurnOutcome {
            summary: Some(summary),
            notes: Vec::new(),
            completed_at: Utc::now(),
        })
    }

    async fn doc_refine(
        &mut self,
        request: DocRefineRequest,
    ) -> Result<AgentTurnOutcome, AgentError> {
        self.check_cancelled()?;
        if request.instruction.trim().is_empty() {
            return Err(AgentError::InvalidRequest {
                message: "instruction must not be empty".to_string(),
            });
        }
        let summary = format!("Refined docs: {}", request.instruction.trim());
        append_summary_file(&request.docs_workspace_path, &summary)?;
        self.record_turn(format!("doc_refine: {summary}"));
        self.running = false;
        Ok(AgentTurnOutcome {
            summary: Some(summary),
            notes: Vec::new(),
            completed_at: Utc::now(),
        })
    }

    async fn start_stream(&mut self, cancellation: CancellationToken) -> Result<(), AgentError> {
        self.cancellation = Some(cancellation);
        self.running = true;
        Ok(())
    }

    async fn stop_stream(&mut self) {
        if let Some(token) = &self.cancellation {
            token.cancel();
        }
        self.running = false;
    }

    fn conversation_history(&self) -> ConversationHistory {
        if self.turns.is_empty() {
            return ConversationHistory::empty();
        }
        ConversationHistory(serde_json::to_string(&self.turns).unwrap_or_default())
    }

    fn load_conversation_history(&mut self, history: ConversationHistory) -> Result<(), AgentError> {
        if history.is_empty() {
            self.turns.clear();
            return Ok(());
        }
        self.turns = serde_json::from_str(&history.0).map_err(|err| {
            AgentError::InvalidConversationHistory {
                message: err.to_string(),
            }
        })?;
        Ok(())
    }

    fn has_conversation_history(&self) -> bool {
        !self.turns.is_empty()
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            model_key: "openai|gpt-5".to_string(),
            model_display: "GPT-5".to_string(),
            provider: ProviderKind::OpenAi,
            provider_label: "OpenAI".to_string(),
        }
    }

    fn generate_request(workspace: &std::path::Path) -> GenerateDocsRequest {
        GenerateDocsRequest {
            project_name: "demo".to_string(),
            code_root: "/tmp/code".into(),
            docs_workspace_path: workspace.to_path_buf(),
            docs_relative_path: "docs".into(),
            source_branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
            source_commit: "bbb".to_string(),
            scoped_diff: "diff --git a/src/lib.rs b/src/lib.rs\n".to_string(),
            changed_files: vec!["src/lib.rs".to_string()],
            user_instructions: String::new(),
        }
    }

    #[tokio::test]
    async fn generate_docs_records_a_turn_and_reports_no_history_before_it() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let mut client = StubLlmClient::new(metadata(), ProviderOptions::default());
        assert!(!client.has_conversation_history());

        let outcome = client
            .generate_docs(generate_request(workspace.path()))
            .await
            .expect("turn");
        assert!(outcome.summary.unwrap().contains("feature/x"));
        assert!(client.has_conversation_history());
        assert!(workspace.path().join(SUMMARY_FILE_NAME).is_file());
    }

    #[tokio::test]
    async fn generate_docs_rejects_empty_source_branch() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let mut client = StubLlmClient::new(metadata(), ProviderOptions::default());
        let mut request = generate_request(workspace.path());
        request.source_branch = "  ".to_string();
        let err = client.generate_docs(request).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn conversation_history_round_trips_through_a_fresh_client() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let mut client = StubLlmClient::new(metadata(), ProviderOptions::default());
        client
            .generate_docs(generate_request(workspace.path()))
            .await
            .expect("turn");
        let dumped = client.conversation_history();
        assert!(!dumped.is_empty());

        let mut restored = StubLlmClient::new(metadata(), ProviderOptions::default());
        restored.load_conversation_history(dumped.clone()).expect("load");
        assert!(restored.has_conversation_history());
        assert_eq!(restored.conversation_history(), dumped);
    }

    #[tokio::test]
    async fn stop_stream_cancels_the_bound_token_and_clears_running() {
        let mut client = StubLlmClient::new(metadata(), ProviderOptions::default());
        let token = CancellationToken::new();
        client.start_stream(token.clone()).await.expect("start");
        assert!(client.is_running());

        client.stop_stream().await;
        assert!(!client.is_running());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn a_cancelled_token_fails_the_next_turn() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let mut client = StubLlmClient::new(metadata(), ProviderOptions::default());
        let token = CancellationToken::new();
        client.start_stream(token.clone()).await.expect("start");
        token.cancel();

        let err = client
            .generate_docs(generate_request(workspace.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}

//! The `Orchestrator`: every operation in §4.6, wired against the repo
//! primitives in `docs-git` and the LLM client boundary in `docs-agents`.
//!
//! Every operation shares the same preamble (validate non-empty inputs,
//! trim, reject `source == target` where applicable, resolve the
//! project's code/docs repos) and the same shutdown discipline: a
//! reservation taken early is released on every exit path, and a temp
//! workspace created early is removed on every exit path, via the RAII
//! guards `docs-git` already provides.

use std::path::PathBuf;
use std::sync::Arc;

use docs_agents::{
    build_client, AgentTurnOutcome, ConversationHistory, DocRefineRequest, GenerateDocsRequest,
    ModelMetadata, ProviderOptions,
};
use docs_git::{
    branch_ref_exists, capture_status_snapshot, commit_selected_files, compute_scoped_diff,
    discover_repo, has_parent, is_ancestor, resolve_commit, transfer, GitCli, RepoHandle,
    WorkspaceBase, WorkspaceManager,
};
use tokio_util::sync::CancellationToken;

use crate::branch_registry::BranchRegistry;
use crate::config::OrgConfig;
use crate::error::OrchestratorError;
use crate::events::{Event, EventBus};
use crate::session::{ActiveStreams, SessionRuntime, SessionRuntimeTable, TabBindings};
use crate::store::SessionStore;
use crate::types::{
    ChangeStatus, ChangedFile, DocGenerationResult, Project, ProjectId, ProviderKind, SessionInfo,
    SessionKey,
};
use crate::validation::{docs_branch_name, docs_path_is_contained, validate_branch_pair};

/// Docs-repo resolution shared by every operation's preamble.
struct DocRepoConfig {
    code_repo: RepoHandle,
    docs_repo: RepoHandle,
    docs_relative: PathBuf,
    shared_with_code: bool,
}

/// Releases a `BranchRegistry` reservation on every exit path, including
/// early returns via `?`.
struct ReservationGuard<'a> {
    registry: &'a BranchRegistry,
    name: String,
}

impl<'a> ReservationGuard<'a> {
    fn new(registry: &'a BranchRegistry, name: String) -> Self {
        Self { registry, name }
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}

/// The Narrabyte documentation generation orchestrator. Cheaply shared:
/// every field is either immutable for the orchestrator's lifetime or
/// internally synchronized, so callers hold it behind a single `Arc`
/// rather than behind per-request locks.
pub struct Orchestrator {
    config: OrgConfig,
    git: GitCli,
    workspace: WorkspaceManager,
    branch_registry: BranchRegistry,
    runtimes: SessionRuntimeTable,
    active_streams: ActiveStreams,
    tab_bindings: TabBindings,
    events: EventBus,
    store: Arc<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(config: OrgConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            git: GitCli::default(),
            workspace: WorkspaceManager::default(),
            branch_registry: BranchRegistry::new(),
            runtimes: SessionRuntimeTable::new(),
            active_streams: ActiveStreams::new(),
            tab_bindings: TabBindings::new(),
            events: EventBus::new(),
            store,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &OrgConfig {
        &self.config
    }

    // ---- preamble helpers -------------------------------------------------

    fn require_project(&self, project_id: &ProjectId) -> Result<&Project, OrchestratorError> {
        Ok(self.config.require_project(project_id)?)
    }

    fn resolve_doc_repo(&self, project: &Project) -> Result<DocRepoConfig, OrchestratorError> {
        let code_repo = discover_repo(&project.code_root, &self.git)?;
        let docs_repo = discover_repo(&project.docs_root, &self.git)?;
        let docs_relative = PathBuf::new();
        if !docs_path_is_contained(&docs_relative) {
            return Err(OrchestratorError::InvalidInput {
                message: "docs path escapes repo root".to_string(),
            });
        }
        // Authoritative per the glossary's "same Git root" definition: two
        // distinct configured paths that both resolve inside one repo must
        // still read as shared, so this compares the discovered toplevels
        // rather than `project.code_root`/`project.docs_root` directly.
        let shared_with_code = code_repo.root == docs_repo.root;
        Ok(DocRepoConfig {
            shared_with_code,
            code_repo,
            docs_repo,
            docs_relative,
        })
    }

    fn resolve_branch_hash(&self, repo: &RepoHandle, branch: &str) -> Result<String, OrchestratorError> {
        resolve_commit(repo, &self.git, branch).map_err(|_| OrchestratorError::BranchNotFound {
            branch: branch.to_string(),
        })
    }

    fn resolve_base(
        &self,
        project: &Project,
        doc_repo: &DocRepoConfig,
        source_branch: &str,
        source_hash: &str,
    ) -> Result<(String, String), OrchestratorError> {
        if doc_repo.shared_with_code {
            return Ok((source_branch.to_string(), source_hash.to_string()));
        }
        let base_branch = project.documentation_base_branch.clone().ok_or_else(|| {
            OrchestratorError::NotConfigured {
                message: format!("project {} has no documentation_base_branch configured", project.id),
            }
        })?;
        let base_hash = self.resolve_branch_hash(&doc_repo.docs_repo, &base_branch)?;
        Ok((base_branch, base_hash))
    }

    /// Checks the reservation gate (§4.6.1 step 5) and, if the name is
    /// free, reserves it. Returns a guard that releases the reservation on
    /// every exit path.
    fn reserve_docs_branch<'a>(
        &'a self,
        repo: &RepoHandle,
        branch: &str,
    ) -> Result<ReservationGuard<'a>, OrchestratorError> {
        if branch_ref_exists(repo, &self.git, branch) {
            let suggested = self.branch_registry.suggest_alternative(repo, &self.git, branch).ok();
            return Err(OrchestratorError::DocsBranchExists {
                name: branch.to_string(),
                suggested,
            });
        }
        match self.branch_registry.reserve(branch) {
            Ok(()) => Ok(ReservationGuard::new(&self.branch_registry, branch.to_string())),
            Err(OrchestratorError::DocsGenerationInProgress { name, .. }) => {
                let suggested = self.branch_registry.suggest_alternative(repo, &self.git, branch).ok();
                Err(OrchestratorError::DocsGenerationInProgress { name, suggested })
            }
            Err(other) => Err(other),
        }
    }

    fn parse_model_key(model_key: &str) -> Result<(ProviderKind, String), OrchestratorError> {
        let trimmed = model_key.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::InvalidInput {
                message: "model_key must not be empty".to_string(),
            });
        }
        let (provider_raw, model_raw) = trimmed.split_once('|').ok_or_else(|| OrchestratorError::InvalidInput {
            message: format!("model_key '{trimmed}' must be formatted as '<provider>|<model>'"),
        })?;
        let provider = match provider_raw {
            "openai" => ProviderKind::OpenAi,
            "anthropic" => ProviderKind::Anthropic,
            "gemini" => ProviderKind::Gemini,
            other => {
                return Err(OrchestratorError::InvalidInput {
                    message: format!("unknown model provider '{other}'"),
                })
            }
        };
        Ok((provider, model_raw.to_string()))
    }

    fn model_metadata(model_key: &str) -> Result<ModelMetadata, OrchestratorError> {
        let (provider, model_display) = Self::parse_model_key(model_key)?;
        let agent_provider = to_agent_provider(provider);
        Ok(ModelMetadata {
            model_key: model_key.to_string(),
            model_display,
            provider: agent_provider,
            provider_label: provider.to_string(),
        })
    }

    /// Takes any existing runtime out of the table and stops its stream,
    /// per the SessionRuntime lifecycle's replacement rule (§4.5).
    async fn stop_and_take_existing(&self, key: &SessionKey) -> Option<SessionRuntime> {
        let existing = self.runtimes.take(key)?;
        let mut existing = existing;
        if existing.is_running() {
            existing.client.stop_stream().await;
            self.active_streams.clear(key);
            self.events.publish(Event::warn(key.clone(), "Cancel requested"));
        }
        Some(existing)
    }

    /// Rehydrates a SessionRuntime from the SessionStore for `RefineDocs`
    /// when no live runtime is currently registered under `key` (§4.6.2).
    fn rehydrate_runtime(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<SessionRuntime, OrchestratorError> {
        let row = self
            .store
            .get(project_id.as_ref(), source_branch, target_branch)?
            .ok_or_else(|| OrchestratorError::StaleSession {
                project_id: project_id.0.clone(),
                source: source_branch.to_string(),
            })?;
        let metadata = Self::model_metadata(&row.model_key)?;
        let mut client = build_client(metadata.clone(), ProviderOptions::default());
        client
            .load_conversation_history(ConversationHistory(row.conversation_json))?;
        Ok(SessionRuntime {
            client,
            model_key: metadata.model_key,
            model_display: metadata.model_display,
            provider: to_core_provider(metadata.provider),
            provider_label: metadata.provider_label,
            target_branch: target_branch.to_string(),
            cancellation: None,
        })
    }

    /// Binds a fresh cancellable context to `runtime` and registers it so
    /// `stop_stream` can reach it, per the SessionRuntime lifecycle (§4.5).
    async fn begin_stream(&self, key: &SessionKey, runtime: &mut SessionRuntime) -> Result<(), OrchestratorError> {
        let token = CancellationToken::new();
        self.active_streams.register(key.clone(), token.clone());
        match runtime.client.start_stream(token.clone()).await {
            Ok(()) => {
                runtime.cancellation = Some(token);
                Ok(())
            }
            Err(err) => {
                self.active_streams.clear(key);
                Err(err.into())
            }
        }
    }

    fn end_stream(&self, key: &SessionKey, runtime: &mut SessionRuntime) {
        self.active_streams.clear(key);
        runtime.cancellation = None;
    }

    // ---- 4.6.1 GenerateDocs ------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn generate_docs(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
        target_branch: &str,
        model_key: &str,
        user_instructions: &str,
        docs_branch_override: Option<&str>,
        session_key_override: Option<&str>,
    ) -> Result<DocGenerationResult, OrchestratorError> {
        validate_branch_pair(source_branch, target_branch)?;
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;
        let session_key = SessionKey::resolve(project_id, source_branch, session_key_override);

        self.stop_and_take_existing(&session_key).await;

        let source_hash = self.resolve_branch_hash(&doc_repo.code_repo, source_branch)?;
        let target_hash = self.resolve_branch_hash(&doc_repo.code_repo, target_branch)?;

        let exclusions = self.config.diff_exclusions.clone();
        let scoped = compute_scoped_diff(&doc_repo.code_repo, &self.git, &target_hash, &source_hash, |p| {
            exclusions.matches(p)
        })?;

        let (base_branch, base_hash) = self.resolve_base(&project, &doc_repo, source_branch, &source_hash)?;
        let docs_branch = docs_branch_name(source_branch, docs_branch_override);

        let _reservation = self.reserve_docs_branch(&doc_repo.docs_repo, &docs_branch)?;
        self.events.publish(Event::info(
            session_key.clone(),
            format!("generating docs for {source_branch} onto {docs_branch}"),
        ));

        let (workspace, cleanup, warnings) = self.workspace.create(
            &doc_repo.docs_repo.root,
            &doc_repo.docs_relative,
            &WorkspaceBase::AtBase {
                base_branch,
                base_hash,
                target_branch: docs_branch.clone(),
            },
        )?;
        for warning in &warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let metadata = Self::model_metadata(model_key)?;
        let mut runtime = SessionRuntime {
            client: build_client(metadata.clone(), ProviderOptions::default()),
            model_key: metadata.model_key.clone(),
            model_display: metadata.model_display.clone(),
            provider: to_core_provider(metadata.provider),
            provider_label: metadata.provider_label.clone(),
            target_branch: target_branch.to_string(),
            cancellation: None,
        };

        let request = GenerateDocsRequest {
            project_name: project.name.clone(),
            code_root: doc_repo.code_repo.root.clone(),
            docs_workspace_path: workspace.docs_path.clone(),
            docs_relative_path: doc_repo.docs_relative.clone(),
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            source_commit: source_hash.clone(),
            scoped_diff: scoped.unified_diff.clone(),
            changed_files: scoped.changed_paths.clone(),
            user_instructions: user_instructions.to_string(),
        };

        if let Err(err) = self.begin_stream(&session_key, &mut runtime).await {
            if let Err(remove_err) = cleanup.finish() {
                self.events.publish(Event::warn(
                    session_key.clone(),
                    format!("failed to remove temp workspace: {remove_err}"),
                ));
            }
            self.runtimes.insert(session_key.clone(), runtime);
            return Err(err);
        }
        let turn_result = runtime.client.generate_docs(request).await;
        self.end_stream(&session_key, &mut runtime);

        let outcome = match turn_result {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(remove_err) = cleanup.finish() {
                    self.events.publish(Event::warn(
                        session_key.clone(),
                        format!("failed to remove temp workspace: {remove_err}"),
                    ));
                }
                self.runtimes.insert(session_key.clone(), runtime);
                return Err(err.into());
            }
        };

        let identity = self.config.commit_identity.clone().with_env_overrides();
        let commit_message = commit_message_for(source_branch, &outcome);
        let transfer_result = transfer(
            &workspace,
            &doc_repo.docs_relative,
            &doc_repo.docs_repo,
            &docs_branch,
            &self.git,
            &identity.name,
            &identity.email,
            &commit_message,
        );

        if let Err(remove_err) = cleanup.finish() {
            self.events.publish(Event::warn(
                session_key.clone(),
                format!("failed to remove temp workspace: {remove_err}"),
            ));
        }

        let (transfer_result, transfer_warnings) = transfer_result?;
        for warning in &transfer_warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let conversation_json = runtime.client.conversation_history().0;
        self.store.upsert(
            project_id.as_ref(),
            source_branch,
            target_branch,
            &runtime.model_key,
            &runtime.provider_label,
            &conversation_json,
        )?;
        self.runtimes.insert(session_key.clone(), runtime);

        let diff = self.diff_docs_branch_vs_base(&doc_repo, &project, source_branch, &docs_branch)?;

        self.events
            .publish(Event::info(session_key.clone(), "docs generation complete"));

        Ok(DocGenerationResult {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            docs_branch,
            docs_in_code_repo: doc_repo.shared_with_code,
            files: transfer_result.files.into_iter().map(to_core_changed_file).collect(),
            diff,
            summary: outcome.summary,
        })
    }

    // ---- 4.6.2 RefineDocs ---------------------------------------------------

    pub async fn refine_docs(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
        instruction: &str,
        session_key_override: Option<&str>,
    ) -> Result<DocGenerationResult, OrchestratorError> {
        crate::validation::validate_non_empty(instruction, "instruction")?;
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;
        let session_key = SessionKey::resolve(project_id, source_branch, session_key_override);
        let docs_branch = docs_branch_name(source_branch, None);

        let existing = self.stop_and_take_existing(&session_key).await;
        let runtime = match existing {
            Some(runtime) => runtime,
            None => {
                let target = self.most_recent_target(project_id, source_branch)?;
                self.rehydrate_runtime(project_id, source_branch, &target)?
            }
        };

        self.branch_registry.reserve(&docs_branch)?;
        let _reservation = ReservationGuard::new(&self.branch_registry, docs_branch.clone());

        let base_hash = if doc_repo.shared_with_code {
            self.resolve_branch_hash(&doc_repo.code_repo, source_branch)?
        } else {
            let base_branch = project.documentation_base_branch.clone().ok_or_else(|| {
                OrchestratorError::NotConfigured {
                    message: format!("project {} has no documentation_base_branch configured", project.id),
                }
            })?;
            self.resolve_branch_hash(&doc_repo.docs_repo, &base_branch)?
        };

        let (workspace, cleanup, warnings) = self.workspace.create(
            &doc_repo.docs_repo.root,
            &doc_repo.docs_relative,
            &WorkspaceBase::AtBranchHead {
                docs_branch: docs_branch.clone(),
                base_hash,
            },
        )?;
        for warning in &warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let request = DocRefineRequest {
            project_name: project.name.clone(),
            docs_workspace_path: workspace.docs_path.clone(),
            docs_relative_path: doc_repo.docs_relative.clone(),
            instruction: instruction.to_string(),
        };

        let mut runtime = runtime;
        if let Err(err) = self.begin_stream(&session_key, &mut runtime).await {
            let _ = cleanup.finish();
            self.runtimes.insert(session_key.clone(), runtime);
            return Err(err);
        }
        let turn_result = runtime.client.doc_refine(request).await;
        self.end_stream(&session_key, &mut runtime);

        let outcome = match turn_result {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = cleanup.finish();
                self.runtimes.insert(session_key.clone(), runtime);
                return Err(err.into());
            }
        };

        let identity = self.config.commit_identity.clone().with_env_overrides();
        let commit_message = format!("docs: refine {source_branch}");
        let transfer_result = transfer(
            &workspace,
            &doc_repo.docs_relative,
            &doc_repo.docs_repo,
            &docs_branch,
            &self.git,
            &identity.name,
            &identity.email,
            &commit_message,
        );
        let _ = cleanup.finish();
        let (transfer_result, transfer_warnings) = transfer_result?;
        for warning in &transfer_warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let target_branch = runtime.target_branch.clone();
        let conversation_json = runtime.client.conversation_history().0;
        self.store.upsert(
            project_id.as_ref(),
            source_branch,
            &target_branch,
            &runtime.model_key,
            &runtime.provider_label,
            &conversation_json,
        )?;
        self.runtimes.insert(session_key.clone(), runtime);

        let diff = self.diff_docs_branch_vs_base(&doc_repo, &project, source_branch, &docs_branch)?;

        Ok(DocGenerationResult {
            source_branch: source_branch.to_string(),
            target_branch,
            docs_branch,
            docs_in_code_repo: doc_repo.shared_with_code,
            files: transfer_result.files.into_iter().map(to_core_changed_file).collect(),
            diff,
            summary: outcome.summary,
        })
    }

    fn most_recent_target(&self, project_id: &ProjectId, source_branch: &str) -> Result<String, OrchestratorError> {
        let rows = self.store.list(project_id.as_ref())?;
        rows.into_iter()
            .find(|row| row.source == source_branch)
            .map(|row| row.target)
            .ok_or_else(|| OrchestratorError::StaleSession {
                project_id: project_id.0.clone(),
                source: source_branch.to_string(),
            })
    }

    // ---- 4.6.3 GenerateDocsFromBranch ---------------------------------------

    pub async fn generate_docs_from_branch(
        &self,
        project_id: &ProjectId,
        branch: &str,
        model_key: &str,
        instructions: &str,
        docs_branch_override: Option<&str>,
        session_key_override: Option<&str>,
    ) -> Result<DocGenerationResult, OrchestratorError> {
        crate::validation::validate_non_empty(branch, "branch")?;
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;
        let session_key = SessionKey::resolve(project_id, branch, session_key_override);

        self.stop_and_take_existing(&session_key).await;

        let branch_hash = self.resolve_branch_hash(&doc_repo.code_repo, branch)?;
        let (base_branch, base_hash) = self.resolve_base(&project, &doc_repo, branch, &branch_hash)?;
        let docs_branch = docs_branch_name(branch, docs_branch_override);

        let _reservation = self.reserve_docs_branch(&doc_repo.docs_repo, &docs_branch)?;
        self.events.publish(Event::info(
            session_key.clone(),
            format!("generating docs from branch {branch} onto {docs_branch}"),
        ));

        let (workspace, cleanup, warnings) = self.workspace.create(
            &doc_repo.docs_repo.root,
            &doc_repo.docs_relative,
            &WorkspaceBase::AtBase {
                base_branch,
                base_hash,
                target_branch: docs_branch.clone(),
            },
        )?;
        for warning in &warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let metadata = Self::model_metadata(model_key)?;
        let mut runtime = SessionRuntime {
            client: build_client(metadata.clone(), ProviderOptions::default()),
            model_key: metadata.model_key.clone(),
            model_display: metadata.model_display.clone(),
            provider: to_core_provider(metadata.provider),
            provider_label: metadata.provider_label.clone(),
            target_branch: branch.to_string(),
            cancellation: None,
        };

        let request = DocRefineRequest {
            project_name: project.name.clone(),
            docs_workspace_path: workspace.docs_path.clone(),
            docs_relative_path: doc_repo.docs_relative.clone(),
            instruction: instructions.to_string(),
        };

        if let Err(err) = self.begin_stream(&session_key, &mut runtime).await {
            let _ = cleanup.finish();
            self.runtimes.insert(session_key.clone(), runtime);
            return Err(err);
        }
        let turn_result = runtime.client.doc_refine(request).await;
        self.end_stream(&session_key, &mut runtime);

        let outcome = match turn_result {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = cleanup.finish();
                self.runtimes.insert(session_key.clone(), runtime);
                return Err(err.into());
            }
        };

        let identity = self.config.commit_identity.clone().with_env_overrides();
        let commit_message = format!("docs: generate from {branch}");
        let transfer_result = transfer(
            &workspace,
            &doc_repo.docs_relative,
            &doc_repo.docs_repo,
            &docs_branch,
            &self.git,
            &identity.name,
            &identity.email,
            &commit_message,
        );
        let _ = cleanup.finish();
        let (transfer_result, transfer_warnings) = transfer_result?;
        for warning in &transfer_warnings {
            self.events.publish(Event::warn(session_key.clone(), warning.clone()));
        }

        let conversation_json = runtime.client.conversation_history().0;
        self.store.upsert(
            project_id.as_ref(),
            branch,
            branch,
            &runtime.model_key,
            &runtime.provider_label,
            &conversation_json,
        )?;
        self.runtimes.insert(session_key.clone(), runtime);

        let diff = self.diff_docs_branch_vs_base(&doc_repo, &project, branch, &docs_branch)?;

        Ok(DocGenerationResult {
            source_branch: branch.to_string(),
            target_branch: branch.to_string(),
            docs_branch,
            docs_in_code_repo: doc_repo.shared_with_code,
            files: transfer_result.files.into_iter().map(to_core_changed_file).collect(),
            diff,
            summary: outcome.summary,
        })
    }

    // ---- 4.6.4 CommitDocs ----------------------------------------------------

    pub fn commit_docs(
        &self,
        project_id: &ProjectId,
        branch: &str,
        files: &[String],
    ) -> Result<DocGenerationResult, OrchestratorError> {
        crate::validation::validate_non_empty(branch, "branch")?;
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;

        if !branch_ref_exists(&doc_repo.docs_repo, &self.git, branch) {
            return Err(OrchestratorError::BranchNotFound {
                branch: branch.to_string(),
            });
        }

        let normalized: Vec<String> = files
            .iter()
            .map(|f| crate::validation::normalize_path_separators(f.trim()))
            .filter(|f| !f.is_empty())
            .filter(|f| docs_path_is_contained(&PathBuf::from(f)))
            .collect();
        if normalized.is_empty() {
            return Err(OrchestratorError::InvalidInput {
                message: "no eligible files to commit".to_string(),
            });
        }

        let identity = self.config.commit_identity.clone().with_env_overrides();
        let commit_message = format!("docs: manual edits on {branch}");
        let new_hash = commit_selected_files(
            &doc_repo.docs_repo,
            &self.git,
            branch,
            &normalized,
            &identity.name,
            &identity.email,
            &commit_message,
        )?;
        let Some(new_hash) = new_hash else {
            return Err(OrchestratorError::InvalidInput {
                message: "none of the requested files have pending changes".to_string(),
            });
        };

        let status = capture_status_snapshot(&doc_repo.docs_repo, &self.git)?;
        let committed: Vec<ChangedFile> = status
            .changed_files
            .iter()
            .filter(|f| normalized.contains(&f.path.to_string_lossy().replace('\\', "/")))
            .cloned()
            .map(to_core_changed_file)
            .collect();

        let diff = self.diff_docs_branch_vs_base(&doc_repo, &project, branch, branch)?;

        Ok(DocGenerationResult {
            source_branch: branch.to_string(),
            target_branch: branch.to_string(),
            docs_branch: branch.to_string(),
            docs_in_code_repo: doc_repo.shared_with_code,
            files: committed,
            diff,
            summary: Some(format!("committed {new_hash}")),
        })
    }

    // ---- 4.6.5 MergeDocsIntoSource -------------------------------------------

    pub fn merge_docs_into_source(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
    ) -> Result<(), OrchestratorError> {
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;

        if !doc_repo.shared_with_code {
            return Err(OrchestratorError::InvalidInput {
                message: "merging docs into source requires docs and code to share one repo".to_string(),
            });
        }

        let docs_branch = docs_branch_name(source_branch, None);
        let repo = &doc_repo.code_repo;

        if !branch_ref_exists(repo, &self.git, source_branch) {
            return Err(OrchestratorError::BranchNotFound {
                branch: source_branch.to_string(),
            });
        }
        if !branch_ref_exists(repo, &self.git, &docs_branch) {
            return Err(OrchestratorError::BranchNotFound {
                branch: docs_branch,
            });
        }

        let docs_hash = self.resolve_branch_hash(repo, &docs_branch)?;
        if !has_parent(repo, &self.git, &docs_hash)? {
            return Err(OrchestratorError::InvalidInput {
                message: format!("{docs_branch} has no parent commit to merge"),
            });
        }
        if !is_ancestor(repo, &self.git, source_branch, &docs_branch)? {
            return Err(OrchestratorError::InvalidInput {
                message: format!("{source_branch} is not an ancestor of {docs_branch}"),
            });
        }

        let current_branch = docs_git::current_branch(repo, &self.git)?;
        let on_source = current_branch == source_branch;
        if on_source {
            let status = capture_status_snapshot(repo, &self.git)?;
            if !status.clean {
                return Err(OrchestratorError::UncommittedChangesOnSourceBranch);
            }
        }

        docs_git::update_branch_ref(repo, &self.git, source_branch, &docs_hash)?;
        if on_source {
            docs_git::hard_reset(repo, &self.git, &docs_hash)?;
        }

        Ok(())
    }

    // ---- 4.6.6 LoadGenerationSession ------------------------------------------

    pub fn load_generation_session(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<DocGenerationResult, OrchestratorError> {
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;

        let row = self
            .store
            .get(project_id.as_ref(), source_branch, target_branch)?
            .ok_or_else(|| OrchestratorError::StaleSession {
                project_id: project_id.0.clone(),
                source: source_branch.to_string(),
            })?;

        let docs_branch = docs_branch_name(source_branch, None);
        if !branch_ref_exists(&doc_repo.docs_repo, &self.git, &docs_branch) {
            return Err(OrchestratorError::StaleSession {
                project_id: project_id.0.clone(),
                source: source_branch.to_string(),
            });
        }

        let metadata = Self::model_metadata(&row.model_key)?;
        let mut client = build_client(metadata.clone(), ProviderOptions::default());
        client.load_conversation_history(ConversationHistory(row.conversation_json))?;
        let runtime = SessionRuntime {
            client,
            model_key: metadata.model_key,
            model_display: metadata.model_display,
            provider: to_core_provider(metadata.provider),
            provider_label: metadata.provider_label,
            target_branch: target_branch.to_string(),
            cancellation: None,
        };
        let session_key = SessionKey::canonical(project_id, source_branch);
        self.runtimes.insert(session_key, runtime);

        let diff = self.diff_docs_branch_vs_base(&doc_repo, &project, source_branch, &docs_branch)?;
        let status = capture_status_snapshot(&doc_repo.docs_repo, &self.git)?;
        let files = status.changed_files.into_iter().map(to_core_changed_file).collect();

        Ok(DocGenerationResult {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            docs_branch,
            docs_in_code_repo: doc_repo.shared_with_code,
            files,
            diff,
            summary: Some("restored".to_string()),
        })
    }

    // ---- 4.6.7 Conflict resolution --------------------------------------------

    /// Deletes the existing `docs/<source>` ref, freeing the name for a
    /// retried `generate_docs` call.
    pub fn resolve_by_delete(&self, project_id: &ProjectId, source_branch: &str) -> Result<(), OrchestratorError> {
        let project = self.require_project(project_id)?.clone();
        let doc_repo = self.resolve_doc_repo(&project)?;
        let docs_branch = docs_branch_name(source_branch, None);
        docs_git::delete_branch_ref(&doc_repo.docs_repo, &self.git, &docs_branch)?;
        Ok(())
    }

    /// Names the override a retried `generate_docs` call should pass as
    /// `docs_branch_override`. Validation of the new name happens inside
    /// that retried call's own reservation gate.
    pub fn resolve_by_rename(&self, new_docs_branch: &str) -> Result<String, OrchestratorError> {
        crate::validation::validate_non_empty(new_docs_branch, "new_docs_branch")?;
        Ok(new_docs_branch.trim().to_string())
    }

    // ---- 4.6.8 Session/tab bookkeeping ----------------------------------------

    pub fn bind_session_to_tab(&self, project_id: &ProjectId, source_branch: &str) {
        self.tab_bindings.bind(SessionKey::canonical(project_id, source_branch));
    }

    pub fn unbind_session_from_tab(&self, project_id: &ProjectId, source_branch: &str) {
        self.tab_bindings.unbind(&SessionKey::canonical(project_id, source_branch));
    }

    pub fn get_available_tab_sessions(&self, project_id: &ProjectId) -> Vec<SessionInfo> {
        self.runtimes.list_for_project(project_id, &self.tab_bindings)
    }

    pub async fn stop_stream(&self, project_id: &ProjectId, source_branch: &str, session_key_override: Option<&str>) {
        let key = SessionKey::resolve(project_id, source_branch, session_key_override);
        if self.active_streams.cancel(&key) {
            self.events.publish(Event::warn(key, "Cancel requested"));
        }
    }

    pub fn validate_branch_pair(
        &self,
        project_id: &ProjectId,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), OrchestratorError> {
        validate_branch_pair(source_branch, target_branch)?;
        let existing = self.store.get(project_id.as_ref(), source_branch, target_branch)?;
        let tab_bound = existing.is_some()
            && self
                .tab_bindings
                .is_bound(&SessionKey::canonical(project_id, source_branch));
        self.branch_registry
            .validate_branch_pair(source_branch, target_branch, tab_bound)
    }

    // ---- shared helpers --------------------------------------------------

    fn diff_docs_branch_vs_base(
        &self,
        doc_repo: &DocRepoConfig,
        project: &Project,
        source_branch: &str,
        docs_branch: &str,
    ) -> Result<String, OrchestratorError> {
        let base_hash = if doc_repo.shared_with_code {
            self.resolve_branch_hash(&doc_repo.docs_repo, source_branch)?
        } else {
            let base_branch = project.documentation_base_branch.clone().ok_or_else(|| {
                OrchestratorError::NotConfigured {
                    message: format!("project {} has no documentation_base_branch configured", project.id),
                }
            })?;
            self.resolve_branch_hash(&doc_repo.docs_repo, &base_branch)?
        };
        let docs_hash = self.resolve_branch_hash(&doc_repo.docs_repo, docs_branch)?;
        let output = self
            .git
            .run(&doc_repo.docs_repo.root, ["diff", "--no-color", &format!("{base_hash}..{docs_hash}")])?;
        Ok(output.stdout)
    }
}

fn commit_message_for(source_branch: &str, outcome: &AgentTurnOutcome) -> String {
    match &outcome.summary {
        Some(summary) => format!("docs: generate for {source_branch}\n\n{summary}"),
        None => format!("docs: generate for {source_branch}"),
    }
}

fn to_agent_provider(provider: ProviderKind) -> docs_agents::ProviderKind {
    match provider {
        ProviderKind::OpenAi => docs_agents::ProviderKind::OpenAi,
        ProviderKind::Anthropic => docs_agents::ProviderKind::Anthropic,
        ProviderKind::Gemini => docs_agents::ProviderKind::Gemini,
    }
}

fn to_core_provider(provider: docs_agents::ProviderKind) -> ProviderKind {
    match provider {
        docs_agents::ProviderKind::OpenAi => ProviderKind::OpenAi,
        docs_agents::ProviderKind::Anthropic => ProviderKind::Anthropic,
        docs_agents::ProviderKind::Gemini => ProviderKind::Gemini,
    }
}

fn to_core_changed_file(file: docs_git::ChangedFile) -> ChangedFile {
    ChangedFile {
        path: file.path.to_string_lossy().replace('\\', "/"),
        status: match file.state {
            docs_git::FileState::Added | docs_git::FileState::Untracked => ChangeStatus::Added,
            docs_git::FileState::Modified => ChangeStatus::Modified,
            docs_git::FileState::Deleted => ChangeStatus::Deleted,
            docs_git::FileState::Renamed | docs_git::FileState::Copied => ChangeStatus::Renamed,
            docs_git::FileState::Unmerged | docs_git::FileState::Unknown => ChangeStatus::Modified,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSessionStore;
    use std::process::Command;

    fn unique_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docs-core-orch-{prefix}-{}", uuid::Uuid::new_v4().simple()))
    }

    fn run_git(cwd: &std::path::Path, args: &[&str]) {
        let output = Command::new("git").args(args).current_dir(cwd).output().expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// A single repo used as both code and docs root (`shared_with_code`).
    fn init_shared_repo() -> PathBuf {
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

    fn orchestrator_for(root: &PathBuf) -> Orchestrator {
        let mut config = OrgConfig::default();
        config.upsert_project(Project {
            id: ProjectId::new("p1"),
            name: "demo".to_string(),
            code_root: root.clone(),
            docs_root: root.clone(),
            documentation_base_branch: None,
        });
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        Orchestrator::new(config, store)
    }

    #[tokio::test]
    async fn generate_docs_creates_a_docs_branch_with_the_agents_changes() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        let result = orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("generate_docs");

        assert_eq!(result.docs_branch, "docs/feature/x");
        assert!(result.docs_in_code_repo);
        assert!(!result.files.is_empty());

        let repo = RepoHandle {
            root: root.clone(),
            git_dir: root.join(".git"),
        };
        assert!(branch_ref_exists(&repo, &GitCli::default(), "docs/feature/x"));

        let sessions = orchestrator.get_available_tab_sessions(&project_id);
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].running);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn generate_docs_rejects_a_conflicting_branch_name_with_a_suggestion() {
        let root = init_shared_repo();
        run_git(&root, &["branch", "docs/feature/x"]);
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        let err = orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .unwrap_err();

        match err {
            OrchestratorError::DocsBranchExists { name, suggested } => {
                assert_eq!(name, "docs/feature/x");
                assert_eq!(suggested.as_deref(), Some("docs/feature/x-2"));
            }
            other => panic!("expected DocsBranchExists, got {other:?}"),
        }

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn refine_docs_rehydrates_a_runtime_when_none_is_registered() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("generate_docs");

        // Drop the in-memory runtime to force rehydration from the store.
        orchestrator.stop_stream(&project_id, "feature/x", None).await;
        let key = SessionKey::canonical(&project_id, "feature/x");
        orchestrator.runtimes.take(&key);

        let result = orchestrator
            .refine_docs(&project_id, "feature/x", "add a usage example", None)
            .await
            .expect("refine_docs");

        assert_eq!(result.docs_branch, "docs/feature/x");
        assert!(result.summary.unwrap().contains("add a usage example"));

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn merge_docs_into_source_fast_forwards_when_ancestry_holds() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("generate_docs");

        orchestrator
            .merge_docs_into_source(&project_id, "feature/x")
            .expect("merge");

        let repo = RepoHandle {
            root: root.clone(),
            git_dir: root.join(".git"),
        };
        let git = GitCli::default();
        let docs_hash = resolve_commit(&repo, &git, "docs/feature/x").unwrap();
        let source_hash = resolve_commit(&repo, &git, "feature/x").unwrap();
        assert_eq!(docs_hash, source_hash);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn resolve_by_delete_frees_the_name_for_a_retry() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("generate_docs");

        let err = orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DocsBranchExists { .. }));

        orchestrator
            .resolve_by_delete(&project_id, "feature/x")
            .expect("resolve_by_delete");

        orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("retry after delete");

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn commit_docs_refuses_when_no_files_are_eligible() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        let err = orchestrator
            .commit_docs(&project_id, "main", &["does-not-exist.md".to_string()])
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput { .. }));

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn tab_bookkeeping_marks_sessions_bound() {
        let root = init_shared_repo();
        let orchestrator = orchestrator_for(&root);
        let project_id = ProjectId::new("p1");

        orchestrator
            .generate_docs(&project_id, "feature/x", "main", "openai|gpt-5", "", None, None)
            .await
            .expect("generate_docs persists a session row");

        orchestrator.bind_session_to_tab(&project_id, "feature/x");
        let err = orchestrator
            .validate_branch_pair(&project_id, "feature/x", "main")
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SessionAlreadyInTab { .. }));

        orchestrator.unbind_session_from_tab(&project_id, "feature/x");
        orchestrator
            .validate_branch_pair(&project_id, "feature/x", "main")
            .expect("accepted once unbound");

        std::fs::remove_dir_all(root).ok();
    }
}

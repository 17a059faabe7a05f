//! Commits the agent's changes in a temp workspace and transfers the
//! resulting objects into the canonical docs repo (`ObjectTransfer`, §4.3).
//!
//! Object transfer shells out to `git fetch` against the temp workspace's
//! filesystem path, which makes git's own object-walking do the "copy
//! commit/tree/blobs, skip what's already present" work, followed by an
//! explicit `update-ref`. This crate never reimplements pack/object
//! encoding by hand.

use std::path::Path;

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;
use crate::status::{capture_status_snapshot, ChangedFile};
use crate::workspace::{remove_instructions_dir, TempWorkspace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub files: Vec<ChangedFile>,
    pub new_commit: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn transfer(
    workspace: &TempWorkspace,
    docs_relative: &Path,
    canonical: &RepoHandle,
    docs_branch: &str,
    git: &GitCli,
    author_name: &str,
    author_email: &str,
    commit_message: &str,
) -> Result<(TransferResult, Vec<String>), GitError> {
    let mut warnings = Vec::new();

    remove_instructions_dir(&workspace.docs_path).map_err(|source| GitError::Parse {
        context: format!("failed to remove instructions dir before commit: {source}"),
    })?;

    let workspace_repo = RepoHandle {
        root: workspace.repo_path.clone(),
        git_dir: workspace.repo_path.join(".git"),
    };
    let status = capture_status_snapshot(&workspace_repo, git)?;
    let scoped: Vec<ChangedFile> = status
        .changed_files
        .into_iter()
        .filter(|file| path_is_in_subtree(&file.path.to_string_lossy(), docs_relative))
        .collect();

    if scoped.is_empty() {
        return Ok((
            TransferResult {
                files: Vec::new(),
                new_commit: None,
            },
            warnings,
        ));
    }

    stage_docs_subtree(&workspace.repo_path, docs_relative, git)?;
    commit_staged(&workspace.repo_path, git, author_name, author_email, commit_message)?;

    let new_hash = git
        .run(&workspace.repo_path, ["rev-parse", "HEAD"])?
        .stdout
        .trim()
        .to_string();

    transfer_objects(canonical, &workspace.repo_path, &new_hash, git, &mut warnings);

    let refname = format!("refs/heads/{docs_branch}");
    git.run(&canonical.root, ["update-ref", &refname, &new_hash])?;

    Ok((
        TransferResult {
            files: scoped,
            new_commit: Some(new_hash),
        },
        warnings,
    ))
}

fn path_is_in_subtree(path: &str, docs_relative: &Path) -> bool {
    let normalized = path.replace('\\', "/");
    let prefix = docs_relative.to_string_lossy().replace('\\', "/");
    if prefix.is_empty() {
        return true;
    }
    normalized == prefix || normalized.starts_with(&format!("{prefix}/"))
}

fn stage_docs_subtree(repo_root: &Path, docs_relative: &Path, git: &GitCli) -> Result<(), GitError> {
    if docs_relative.as_os_str().is_empty() {
        git.run(repo_root, ["add", "-A", "."])?;
    } else {
        let scoped = docs_relative.to_string_lossy().into_owned();
        git.run(repo_root, ["add", "-A", "--", scoped.as_str()])?;
    }
    Ok(())
}

fn commit_staged(
    repo_root: &Path,
    git: &GitCli,
    author_name: &str,
    author_email: &str,
    message: &str,
) -> Result<(), GitError> {
    let author = format!("{author_name} <{author_email}>");
    git.run(
        repo_root,
        [
            "-c",
            &format!("user.name={author_name}"),
            "-c",
            &format!("user.email={author_email}"),
            "commit",
            "--author",
            &author,
            "-m",
            message,
        ],
    )?;
    Ok(())
}

/// Best-effort object transfer: fetches `commit_hash` (and its full
/// ancestry) from `source_repo_path` into a throwaway scratch ref in the
/// canonical repo, deleting the scratch ref afterward (the objects remain
/// in the object store regardless). A failure here — e.g. an unreachable
/// parent commit the temp workspace's shallow clone never had — is logged
/// as a warning, not propagated: the subsequent `update-ref` is still
/// attempted, and will itself fail loudly if the new commit's own objects
/// truly never arrived.
fn transfer_objects(
    canonical: &RepoHandle,
    source_repo_path: &Path,
    commit_hash: &str,
    git: &GitCli,
    warnings: &mut Vec<String>,
) {
    let scratch_ref = format!("refs/narrabyte/scratch/{}", random_hex16());
    let refspec = format!("{commit_hash}:{scratch_ref}");
    let source = source_repo_path.to_string_lossy().into_owned();

    if let Err(err) = git.run(&canonical.root, ["fetch", "--no-tags", source.as_str(), refspec.as_str()]) {
        warnings.push(format!(
            "object transfer for commit {commit_hash} reported an issue (parent history may be incomplete): {err}"
        ));
    }
    let _ = git.run(&canonical.root, ["update-ref", "-d", &scratch_ref]);
}

fn random_hex16() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Commits a caller-selected subset of files directly against the
/// canonical docs repo's current checkout of `branch` (`CommitDocs`,
/// §4.6.4). Unlike [`transfer`], there is no temp workspace or object
/// walk: the canonical repo's own worktree is staged and committed in
/// place, since `CommitDocs` operates on files the UI already edited
/// there directly.
///
/// Returns `None` if none of `files` has a pending change, which the
/// caller should treat as `InvalidInput` (§8 property 6: idempotence).
pub fn commit_selected_files(
    canonical: &RepoHandle,
    git: &GitCli,
    branch: &str,
    files: &[String],
    author_name: &str,
    author_email: &str,
    commit_message: &str,
) -> Result<Option<String>, GitError> {
    let status = capture_status_snapshot(canonical, git)?;
    let pending: std::collections::HashSet<String> = status
        .changed_files
        .iter()
        .map(|f| f.path.to_string_lossy().replace('\\', "/"))
        .collect();

    let eligible: Vec<&String> = files.iter().filter(|f| pending.contains(f.as_str())).collect();
    if eligible.is_empty() {
        return Ok(None);
    }

    let mut add_args: Vec<&str> = vec!["add", "--"];
    add_args.extend(eligible.iter().map(|f| f.as_str()));
    git.run(&canonical.root, add_args)?;

    commit_staged(&canonical.root, git, author_name, author_email, commit_message)?;

    let new_hash = git.run(&canonical.root, ["rev-parse", "HEAD"])?.stdout.trim().to_string();
    let refname = format!("refs/heads/{branch}");
    git.run(&canonical.root, ["update-ref", &refname, &new_hash])?;

    Ok(Some(new_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn unique_dir(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("docs-git-transfer-{prefix}-{}", random_hex16()))
    }

    fn run_git(cwd: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn init_repo() -> std::path::PathBuf {
        let root = unique_dir("canonical");
        std::fs::create_dir_all(&root).unwrap();
        run_git(&root, &["init", "-q", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        std::fs::write(root.join("README.md"), "hi\n").unwrap();
        run_git(&root, &["add", "."]);
        run_git(&root, &["commit", "-q", "-m", "init"]);
        root
    }

    fn head_sha(repo: &Path) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(repo)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[test]
    fn path_is_in_subtree_matches_root_and_nested() {
        assert!(path_is_in_subtree("docs/guide.md", Path::new("docs")));
        assert!(path_is_in_subtree("docs", Path::new("docs")));
        assert!(!path_is_in_subtree("src/lib.rs", Path::new("docs")));
        assert!(path_is_in_subtree("anything.md", Path::new("")));
    }

    #[test]
    fn transfer_commits_stages_and_updates_ref() {
        let canonical_root = init_repo();
        let base_hash = head_sha(&canonical_root);

        let workspace_root = unique_dir("workspace");
        run_git(
            Path::new("."),
            &[
                "clone",
                "-q",
                canonical_root.to_str().unwrap(),
                workspace_root.to_str().unwrap(),
            ],
        );
        std::fs::write(workspace_root.join("docs.md"), "generated docs\n").unwrap();

        let git = GitCli::default();
        let canonical = RepoHandle {
            root: canonical_root.clone(),
            git_dir: canonical_root.join(".git"),
        };
        let workspace = TempWorkspace {
            repo_path: workspace_root.clone(),
            docs_path: workspace_root.clone(),
        };

        let (result, warnings) = transfer(
            &workspace,
            Path::new(""),
            &canonical,
            "docs/feature-x",
            &git,
            "Narrabyte Documentation Generator",
            "docs@narrabyte.ai",
            "docs: update",
        )
        .expect("transfer");

        assert!(warnings.is_empty() || warnings.iter().all(|w| w.contains("issue")));
        assert_eq!(result.files.len(), 1);
        let new_commit = result.new_commit.expect("new commit");
        assert_ne!(new_commit, base_hash);

        let ref_output = Command::new("git")
            .args(["rev-parse", "refs/heads/docs/feature-x"])
            .current_dir(&canonical_root)
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&ref_output.stdout).trim(),
            new_commit
        );

        std::fs::remove_dir_all(canonical_root).ok();
        std::fs::remove_dir_all(workspace_root).ok();
    }

    #[test]
    fn transfer_returns_empty_when_no_changes_in_scope() {
        let canonical_root = init_repo();
        let workspace_root = unique_dir("workspace-clean");
        run_git(
            Path::new("."),
            &[
                "clone",
                "-q",
                canonical_root.to_str().unwrap(),
                workspace_root.to_str().unwrap(),
            ],
        );

        let git = GitCli::default();
        let canonical = RepoHandle {
            root: canonical_root.clone(),
            git_dir: canonical_root.join(".git"),
        };
        let workspace = TempWorkspace {
            repo_path: workspace_root.clone(),
            docs_path: workspace_root.clone(),
        };

        let (result, _warnings) = transfer(
            &workspace,
            Path::new(""),
            &canonical,
            "docs/feature-x",
            &git,
            "Narrabyte Documentation Generator",
            "docs@narrabyte.ai",
            "docs: update",
        )
        .expect("transfer");

        assert!(result.files.is_empty());
        assert!(result.new_commit.is_none());

        std::fs::remove_dir_all(canonical_root).ok();
        std::fs::remove_dir_all(workspace_root).ok();
    }

    #[test]
    fn commit_selected_files_ignores_unchanged_paths() {
        let canonical_root = init_repo();
        run_git(&canonical_root, &["checkout", "-q", "-b", "docs/feature-x"]);
        let canonical = RepoHandle {
            root: canonical_root.clone(),
            git_dir: canonical_root.join(".git"),
        };
        let git = GitCli::default();

        std::fs::write(canonical_root.join("docs.md"), "new docs\n").unwrap();

        let result = commit_selected_files(
            &canonical,
            &git,
            "docs/feature-x",
            &["README.md".to_string()],
            "Narrabyte Documentation Generator",
            "docs@narrabyte.ai",
            "docs: manual edit",
        )
        .expect("commit attempt");
        assert!(result.is_none(), "README.md was never touched");

        let committed = commit_selected_files(
            &canonical,
            &git,
            "docs/feature-x",
            &["docs.md".to_string()],
            "Narrabyte Documentation Generator",
            "docs@narrabyte.ai",
            "docs: manual edit",
        )
        .expect("commit")
        .expect("a commit happened");

        let ref_output = Command::new("git")
            .args(["rev-parse", "refs/heads/docs/feature-x"])
            .current_dir(&canonical_root)
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&ref_output.stdout).trim(), committed);

        std::fs::remove_dir_all(canonical_root).ok();
    }
}

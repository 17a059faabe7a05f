//! Ephemeral documentation workspaces (`WorkspaceManager`, §4.2).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

/// Where a temp workspace's docs branch is cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceBase {
    /// Clone at `base_branch`, then create `target_branch` from `base_hash`.
    AtBase {
        base_branch: String,
        base_hash: String,
        target_branch: String,
    },
    /// Clone referencing `docs_branch` directly; fall back to creating it
    /// from `base_hash` if the branch doesn't exist locally after clone.
    AtBranchHead {
        docs_branch: String,
        base_hash: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempWorkspace {
    pub repo_path: PathBuf,
    pub docs_path: PathBuf,
}

/// RAII-ish guard for a temp workspace. `Drop` always attempts removal so a
/// panicking caller still cleans up; callers on a normal exit path should
/// prefer [`WorkspaceCleanup::finish`] so they can observe (and log as a
/// warning event) a removal failure instead of silently swallowing it.
#[derive(Debug)]
pub struct WorkspaceCleanup {
    repo_path: PathBuf,
    done: bool,
}

impl WorkspaceCleanup {
    fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            done: false,
        }
    }

    /// Removes the temp workspace now, returning any filesystem error so the
    /// caller can emit a warning event. Never removes twice.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.remove_once()
    }

    fn remove_once(&mut self) -> std::io::Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        match std::fs::remove_dir_all(&self.repo_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for WorkspaceCleanup {
    fn drop(&mut self) {
        let _ = self.remove_once();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceManager {
    pub git: GitCli,
    pub tmp_root: PathBuf,
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self {
            git: GitCli::default(),
            tmp_root: std::env::temp_dir(),
        }
    }
}

impl WorkspaceManager {
    pub fn new(git: GitCli, tmp_root: PathBuf) -> Self {
        Self { git, tmp_root }
    }

    /// Creates a fresh temp directory name `narrabyte-docs-<16-hex>`.
    fn fresh_dir(&self) -> PathBuf {
        self.tmp_root.join(format!("narrabyte-docs-{}", random_hex16()))
    }

    /// Clones `src` into `dest`. Tries a shallow single-branch clone first;
    /// on any failure, retries once with a full clone, pushing a warning
    /// message onto `warnings`.
    fn clone_retrying(
        &self,
        src: &Path,
        dest: &Path,
        branch: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> Result<(), GitError> {
        match self.clone_shallow(src, dest, branch) {
            Ok(()) => Ok(()),
            Err(first_err) => {
                warnings.push(format!(
                    "shallow clone of {} failed ({first_err}); retrying with a full clone",
                    src.display()
                ));
                let _ = std::fs::remove_dir_all(dest);
                self.clone_full(src, dest, branch)
            }
        }
    }

    fn clone_shallow(&self, src: &Path, dest: &Path, branch: Option<&str>) -> Result<(), GitError> {
        let mut args: Vec<OsString> = vec!["clone".into(), "--depth".into(), "1".into(), "--single-branch".into()];
        if let Some(branch) = branch {
            args.push("--branch".into());
            args.push(branch.into());
        }
        args.push(src.as_os_str().to_os_string());
        args.push(dest.as_os_str().to_os_string());
        self.git.run(Path::new("."), args)?;
        Ok(())
    }

    fn clone_full(&self, src: &Path, dest: &Path, branch: Option<&str>) -> Result<(), GitError> {
        let mut args: Vec<OsString> = vec!["clone".into()];
        if let Some(branch) = branch {
            args.push("--branch".into());
            args.push(branch.into());
        }
        args.push(src.as_os_str().to_os_string());
        args.push(dest.as_os_str().to_os_string());
        self.git.run(Path::new("."), args)?;
        Ok(())
    }

    /// Builds a temp workspace per `base`, returning it alongside its
    /// cleanup guard and any non-fatal warnings collected along the way.
    pub fn create(
        &self,
        docs_repo_root: &Path,
        docs_relative: &Path,
        base: &WorkspaceBase,
    ) -> Result<(TempWorkspace, WorkspaceCleanup, Vec<String>), GitError> {
        let repo_path = self.fresh_dir();
        let mut warnings = Vec::new();

        match base {
            WorkspaceBase::AtBase {
                base_branch,
                base_hash,
                target_branch,
            } => {
                self.clone_retrying(docs_repo_root, &repo_path, Some(base_branch), &mut warnings)?;
                self.git
                    .run(&repo_path, ["checkout", "-b", target_branch, base_hash])?;
            }
            WorkspaceBase::AtBranchHead {
                docs_branch,
                base_hash,
            } => {
                let cloned_at_branch = self
                    .clone_retrying(docs_repo_root, &repo_path, Some(docs_branch), &mut warnings)
                    .is_ok();
                if cloned_at_branch {
                    if self.git.run(&repo_path, ["checkout", docs_branch]).is_err() {
                        warnings.push(format!(
                            "docs branch {docs_branch} missing locally after clone; creating from base"
                        ));
                        self.git
                            .run(&repo_path, ["checkout", "-b", docs_branch, base_hash])?;
                    }
                } else {
                    let _ = std::fs::remove_dir_all(&repo_path);
                    self.clone_retrying(docs_repo_root, &repo_path, None, &mut warnings)?;
                    self.git
                        .run(&repo_path, ["checkout", "-b", docs_branch, base_hash])?;
                }
            }
        }

        let docs_path = repo_path.join(docs_relative);
        copy_instructions_dir(docs_repo_root, docs_relative, &repo_path, &mut warnings);

        let workspace = TempWorkspace {
            repo_path: repo_path.clone(),
            docs_path,
        };
        Ok((workspace, WorkspaceCleanup::new(repo_path), warnings))
    }
}

const INSTRUCTIONS_DIR: &str = ".narrabyte";

/// Copies `<docs_path>/.narrabyte/` from the canonical docs repo into the
/// temp workspace, preserving file modes. Missing source directory is not
/// an error — it just means the project has no agent instructions yet —
/// but is recorded as a warning since the agent will run without guidance.
fn copy_instructions_dir(
    docs_repo_root: &Path,
    docs_relative: &Path,
    dest_repo_root: &Path,
    warnings: &mut Vec<String>,
) {
    let src = docs_repo_root.join(docs_relative).join(INSTRUCTIONS_DIR);
    if !src.is_dir() {
        warnings.push(format!(
            "no {INSTRUCTIONS_DIR} directory at {}; agent runs without custom instructions",
            src.display()
        ));
        return;
    }
    let dest = dest_repo_root.join(docs_relative).join(INSTRUCTIONS_DIR);
    if let Err(err) = copy_dir_preserving_modes(&src, &dest) {
        warnings.push(format!(
            "failed to copy {INSTRUCTIONS_DIR} into temp workspace: {err}"
        ));
    }
}

fn copy_dir_preserving_modes(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_preserving_modes(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
            #[cfg(unix)]
            {
                let perms = std::fs::metadata(entry.path())?.permissions();
                std::fs::set_permissions(&dest_path, perms)?;
            }
        }
    }
    Ok(())
}

/// Removes the hidden instructions subdirectory before the final commit
/// (it must never be committed to the docs branch).
pub fn remove_instructions_dir(workspace_docs_path: &Path) -> std::io::Result<()> {
    let path = workspace_docs_path.join(INSTRUCTIONS_DIR);
    match std::fs::remove_dir_all(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn random_hex16() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docs-git-{prefix}-{}", random_hex16()))
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

    fn init_repo_with_commit() -> PathBuf {
        let root = unique_temp_dir("source-repo");
        std::fs::create_dir_all(&root).expect("create temp repo");
        run_git(&root, &["init", "-q", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test User"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        std::fs::write(root.join("README.md"), "hello\n").expect("write file");
        run_git(&root, &["add", "README.md"]);
        run_git(&root, &["commit", "-q", "-m", "init"]);
        root
    }

    fn head_sha(repo: &Path) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(repo)
            .output()
            .expect("head sha");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[test]
    fn random_hex16_is_sixteen_hex_chars() {
        let value = random_hex16();
        assert_eq!(value.len(), 16);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn at_base_creates_new_branch_at_base_hash() {
        let src = init_repo_with_commit();
        let base_hash = head_sha(&src);
        let manager = WorkspaceManager::new(GitCli::default(), std::env::temp_dir());

        let (workspace, cleanup, _warnings) = manager
            .create(
                &src,
                Path::new(""),
                &WorkspaceBase::AtBase {
                    base_branch: "main".to_string(),
                    base_hash: base_hash.clone(),
                    target_branch: "docs/feature-x".to_string(),
                },
            )
            .expect("create workspace");

        assert!(workspace.repo_path.exists());
        assert_eq!(head_sha(&workspace.repo_path), base_hash);

        let repo_path = workspace.repo_path.clone();
        cleanup.finish().expect("cleanup");
        assert!(!repo_path.exists());
        std::fs::remove_dir_all(src).ok();
    }

    #[test]
    fn at_branch_head_falls_back_to_base_when_branch_missing() {
        let src = init_repo_with_commit();
        let base_hash = head_sha(&src);
        let manager = WorkspaceManager::new(GitCli::default(), std::env::temp_dir());

        let (workspace, cleanup, warnings) = manager
            .create(
                &src,
                Path::new(""),
                &WorkspaceBase::AtBranchHead {
                    docs_branch: "docs/does-not-exist-yet".to_string(),
                    base_hash: base_hash.clone(),
                },
            )
            .expect("create workspace");

        assert_eq!(head_sha(&workspace.repo_path), base_hash);
        assert!(!warnings.is_empty());

        cleanup.finish().ok();
        std::fs::remove_dir_all(src).ok();
    }

    #[test]
    fn copy_instructions_dir_preserves_contents() {
        let src = init_repo_with_commit();
        std::fs::create_dir_all(src.join(".narrabyte")).unwrap();
        std::fs::write(src.join(".narrabyte/guide.md"), "be nice\n").unwrap();

        let dest_root = unique_temp_dir("dest-repo");
        std::fs::create_dir_all(&dest_root).unwrap();

        let mut warnings = Vec::new();
        copy_instructions_dir(&src, Path::new(""), &dest_root, &mut warnings);
        assert!(warnings.is_empty());
        assert_eq!(
            std::fs::read_to_string(dest_root.join(".narrabyte/guide.md")).unwrap(),
            "be nice\n"
        );

        std::fs::remove_dir_all(src).ok();
        std::fs::remove_dir_all(dest_root).ok();
    }
}

use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
    pub git_dir: PathBuf,
}

pub fn discover_repo(start_path: &Path, git: &GitCli) -> Result<RepoHandle, GitError> {
    let inside = match git.run(start_path, ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim().eq("true"),
        Err(GitError::CommandFailed { .. }) => false,
        Err(err) => return Err(err),
    };

    if !inside {
        return Err(GitError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let root_raw = git.run(start_path, ["rev-parse", "--show-toplevel"])?;
    let root = PathBuf::from(root_raw.stdout.trim());

    let git_dir_raw = git.run(&root, ["rev-parse", "--git-dir"])?;
    let git_dir_rel = PathBuf::from(git_dir_raw.stdout.trim());
    let git_dir = if git_dir_rel.is_absolute() {
        git_dir_rel
    } else {
        root.join(git_dir_rel)
    };

    Ok(RepoHandle { root, git_dir })
}

pub fn current_branch(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--abbrev-ref", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn head_sha(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

/// Resolves any revision (branch, tag, sha) to its full commit hash.
pub fn resolve_commit(repo: &RepoHandle, git: &GitCli, rev: &str) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--verify", &format!("{rev}^{{commit}}")])?;
    Ok(output.stdout.trim().to_string())
}

/// True iff `refs/heads/<branch>` exists in `repo`.
pub fn branch_ref_exists(repo: &RepoHandle, git: &GitCli, branch: &str) -> bool {
    let refname = format!("refs/heads/{branch}");
    git.run_status(&repo.root, ["show-ref", "--verify", "--quiet", &refname])
        .unwrap_or(false)
}

/// True iff `ancestor` is an ancestor of (or equal to) `descendant`.
pub fn is_ancestor(repo: &RepoHandle, git: &GitCli, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
    git.run_status(&repo.root, ["merge-base", "--is-ancestor", ancestor, descendant])
}

/// True iff `commit` has at least one parent.
pub fn has_parent(repo: &RepoHandle, git: &GitCli, commit: &str) -> Result<bool, GitError> {
    git.run_status(&repo.root, ["rev-parse", "--verify", "--quiet", &format!("{commit}^")])
}

/// Deletes `refs/heads/<branch>` if present; a no-op if it does not exist.
pub fn delete_branch_ref(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<(), GitError> {
    if !branch_ref_exists(repo, git, branch) {
        return Ok(());
    }
    let refname = format!("refs/heads/{branch}");
    git.run(&repo.root, ["update-ref", "-d", &refname])?;
    Ok(())
}

/// Points `refs/heads/<branch>` directly at `hash`, creating it if absent.
pub fn update_branch_ref(repo: &RepoHandle, git: &GitCli, branch: &str, hash: &str) -> Result<(), GitError> {
    let refname = format!("refs/heads/{branch}");
    git.run(&repo.root, ["update-ref", &refname, hash])?;
    Ok(())
}

/// Hard-resets the worktree to `hash`. Only meaningful when `repo`'s
/// current branch is the one being advanced.
pub fn hard_reset(repo: &RepoHandle, git: &GitCli, hash: &str) -> Result<(), GitError> {
    git.run(&repo.root, ["reset", "--hard", hash])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn unique_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docs-git-repo-{prefix}-{}", uuid::Uuid::new_v4().simple()))
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

    fn init_repo_with_commits(n: usize) -> (PathBuf, Vec<String>) {
        let root = unique_dir("ancestry");
        std::fs::create_dir_all(&root).unwrap();
        run_git(&root, &["init", "-q", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        let mut hashes = Vec::new();
        for i in 0..n {
            std::fs::write(root.join("file.txt"), format!("{i}\n")).unwrap();
            run_git(&root, &["add", "."]);
            run_git(&root, &["commit", "-q", "-m", &format!("commit {i}")]);
            let out = Command::new("git").args(["rev-parse", "HEAD"]).current_dir(&root).output().unwrap();
            hashes.push(String::from_utf8_lossy(&out.stdout).trim().to_string());
        }
        (root, hashes)
    }

    #[test]
    fn branch_ref_exists_reflects_created_branches() {
        let (root, _hashes) = init_repo_with_commits(1);
        let git = GitCli::default();
        let repo = RepoHandle { root: root.clone(), git_dir: root.join(".git") };
        assert!(branch_ref_exists(&repo, &git, "main"));
        assert!(!branch_ref_exists(&repo, &git, "does-not-exist"));
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn is_ancestor_detects_ancestry_both_ways() {
        let (root, hashes) = init_repo_with_commits(3);
        let git = GitCli::default();
        let repo = RepoHandle { root: root.clone(), git_dir: root.join(".git") };
        assert!(is_ancestor(&repo, &git, &hashes[0], &hashes[2]).unwrap());
        assert!(!is_ancestor(&repo, &git, &hashes[2], &hashes[0]).unwrap());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn has_parent_is_false_only_for_the_root_commit() {
        let (root, hashes) = init_repo_with_commits(2);
        let git = GitCli::default();
        let repo = RepoHandle { root: root.clone(), git_dir: root.join(".git") };
        assert!(!has_parent(&repo, &git, &hashes[0]).unwrap());
        assert!(has_parent(&repo, &git, &hashes[1]).unwrap());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn delete_branch_ref_is_idempotent() {
        let (root, hashes) = init_repo_with_commits(1);
        let git = GitCli::default();
        let repo = RepoHandle { root: root.clone(), git_dir: root.join(".git") };
        update_branch_ref(&repo, &git, "docs/feature-x", &hashes[0]).unwrap();
        assert!(branch_ref_exists(&repo, &git, "docs/feature-x"));
        delete_branch_ref(&repo, &git, "docs/feature-x").unwrap();
        assert!(!branch_ref_exists(&repo, &git, "docs/feature-x"));
        delete_branch_ref(&repo, &git, "docs/feature-x").unwrap();
        std::fs::remove_dir_all(root).ok();
    }
}

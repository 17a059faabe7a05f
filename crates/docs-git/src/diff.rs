//! Inter-branch diff computation and exclusion-pattern scoping
//! (`DiffScoping`, §4.4).

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedDiff {
    /// Unified diff text with excluded file segments dropped.
    pub unified_diff: String,
    /// Normalized, deduped, sorted changed paths surviving the filter.
    pub changed_paths: Vec<String>,
}

/// Computes the unified diff between `from_hash` and `to_hash`, then drops
/// whole file-segments whose path basename matches `is_excluded`.
///
/// The filter is a pure predicate so `docs-git` never depends on the
/// config layer that owns the exclusion list.
pub fn compute_scoped_diff(
    repo: &RepoHandle,
    git: &GitCli,
    from_hash: &str,
    to_hash: &str,
    is_excluded: impl Fn(&str) -> bool,
) -> Result<ScopedDiff, GitError> {
    let range = format!("{from_hash}..{to_hash}");
    let output = git.run(&repo.root, ["diff", "--no-color", &range])?;
    Ok(scope_diff_text(&output.stdout, is_excluded))
}

fn scope_diff_text(raw: &str, is_excluded: impl Fn(&str) -> bool) -> ScopedDiff {
    let segments = split_into_segments(raw);

    let mut kept = Vec::new();
    let mut changed_paths = Vec::new();

    for segment in segments {
        let Some(path) = extract_path(&segment) else {
            kept.push(segment);
            continue;
        };
        let normalized = path.replace('\\', "/");
        if is_excluded(&normalized) {
            continue;
        }
        changed_paths.push(normalized);
        kept.push(segment);
    }

    changed_paths.sort();
    changed_paths.dedup();

    ScopedDiff {
        unified_diff: kept.join(""),
        changed_paths,
    }
}

/// Splits raw unified-diff text on `diff --git` headers, preserving each
/// header line as the start of its segment.
fn split_into_segments(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for line in raw.split_inclusive('\n') {
        if line.starts_with("diff --git ") && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Extracts the changed path from a diff segment's `+++ b/...` header,
/// falling back to `--- a/...` for pure deletions (`+++ /dev/null`).
fn extract_path(segment: &str) -> Option<String> {
    let mut added_path = None;
    let mut removed_path = None;
    for line in segment.lines() {
        if let Some(rest) = line.strip_prefix("+++ ") {
            if rest.trim() != "/dev/null" {
                added_path = strip_diff_prefix(rest.trim());
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if rest.trim() != "/dev/null" {
                removed_path = strip_diff_prefix(rest.trim());
            }
        }
    }
    added_path.or(removed_path)
}

fn strip_diff_prefix(raw: &str) -> Option<String> {
    raw.strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .map(str::to_string)
        .or_else(|| Some(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "diff --git a/src/lib.rs b/src/lib.rs\n",
        "index 111..222 100644\n",
        "--- a/src/lib.rs\n",
        "+++ b/src/lib.rs\n",
        "@@ -1 +1 @@\n",
        "-old\n",
        "+new\n",
        "diff --git a/Cargo.lock b/Cargo.lock\n",
        "index 333..444 100644\n",
        "--- a/Cargo.lock\n",
        "+++ b/Cargo.lock\n",
        "@@ -1 +1 @@\n",
        "-1\n",
        "+2\n",
    );

    #[test]
    fn drops_excluded_segments_and_keeps_the_rest() {
        let result = scope_diff_text(SAMPLE, |path| path == "Cargo.lock");
        assert_eq!(result.changed_paths, vec!["src/lib.rs".to_string()]);
        assert!(result.unified_diff.contains("src/lib.rs"));
        assert!(!result.unified_diff.contains("Cargo.lock"));
    }

    #[test]
    fn keeps_everything_when_nothing_excluded() {
        let result = scope_diff_text(SAMPLE, |_| false);
        assert_eq!(
            result.changed_paths,
            vec!["Cargo.lock".to_string(), "src/lib.rs".to_string()]
        );
    }

    #[test]
    fn extracts_path_from_added_file_header() {
        let segment = "diff --git a/new.md b/new.md\nnew file mode 100644\nindex 000..111\n--- /dev/null\n+++ b/new.md\n@@ -0,0 +1 @@\n+hi\n";
        assert_eq!(extract_path(segment), Some("new.md".to_string()));
    }

    #[test]
    fn extracts_path_from_deleted_file_header() {
        let segment = "diff --git a/gone.md b/gone.md\ndeleted file mode 100644\nindex 111..000\n--- a/gone.md\n+++ /dev/null\n@@ -1 +0,0 @@\n-bye\n";
        assert_eq!(extract_path(segment), Some("gone.md".to_string()));
    }
}

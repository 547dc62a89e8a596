//! Best-effort git reads: current branch and working-tree status.
//!
//! Nothing here returns an error. A missing git binary, a path that is not a
//! repository, or a non-zero exit all read as "no branch" / "no changes".

use pulse_core::{ChangeType, FileChange, StageState};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct GitReader {
    git_bin: PathBuf,
}

impl Default for GitReader {
    fn default() -> Self {
        Self::new()
    }
}

impl GitReader {
    pub fn new() -> Self {
        Self {
            git_bin: PathBuf::from("git"),
        }
    }

    pub fn with_bin(git_bin: PathBuf) -> Self {
        Self { git_bin }
    }

    /// Branch checked out at `path`. `None` when detached or not a repo.
    pub async fn current_branch(&self, path: &Path) -> Option<String> {
        let stdout = self
            .git_stdout(path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        let branch = stdout.trim();
        if branch.is_empty() || branch == "HEAD" {
            None
        } else {
            Some(branch.to_string())
        }
    }

    pub async fn file_changes(&self, path: &Path) -> Vec<FileChange> {
        let args = ["-c", "core.quotepath=off", "status", "--porcelain", "-z"];
        match self.git_stdout(path, &args).await {
            Some(stdout) => parse_status(&stdout),
            None => Vec::new(),
        }
    }

    async fn git_stdout(&self, cwd: &Path, args: &[&str]) -> Option<String> {
        let result = Command::new(&self.git_bin)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        match result {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                tracing::debug!(cwd = %cwd.display(), ?args, code = ?output.status.code(), "git exited non-zero");
                None
            }
            Err(e) => {
                tracing::debug!(cwd = %cwd.display(), ?args, error = %e, "git unavailable");
                None
            }
        }
    }
}

// ── Porcelain parsing ──

/// Parse NUL-separated `git status --porcelain -z` output. A rename or copy
/// record is followed by an extra record holding the source path, which is
/// skipped.
pub fn parse_status(stdout: &str) -> Vec<FileChange> {
    let mut records = stdout.split('\0');
    let mut changes = Vec::new();
    while let Some(record) = records.next() {
        let Some(change) = parse_status_entry(record) else {
            continue;
        };
        if record[..2].contains(['R', 'C']) {
            records.next();
        }
        changes.push(change);
    }
    changes
}

/// Parse one porcelain entry: two status characters (index, worktree), a
/// space, then the path verbatim.
///
/// Staged iff the index character is neither space nor `?`. Type is checked
/// in priority order added > deleted > modified against both characters.
/// Untracked (`??`) entries are new files: added, unstaged.
pub fn parse_status_entry(record: &str) -> Option<FileChange> {
    let code = record.get(..2)?;
    let path = record.get(3..)?;
    if path.is_empty() {
        return None;
    }

    let index = code.chars().next()?;
    let status = if index == ' ' || index == '?' {
        StageState::Unstaged
    } else {
        StageState::Staged
    };

    let change_type = if code.contains('A') || code == "??" {
        ChangeType::Added
    } else if code.contains('D') {
        ChangeType::Deleted
    } else {
        ChangeType::Modified
    };

    Some(FileChange {
        path: path.to_string(),
        change_type,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, change_type: ChangeType, status: StageState) -> FileChange {
        FileChange {
            path: path.into(),
            change_type,
            status,
        }
    }

    #[test]
    fn staged_modification() {
        assert_eq!(
            parse_status_entry("M  src/app.ts"),
            Some(change("src/app.ts", ChangeType::Modified, StageState::Staged))
        );
    }

    #[test]
    fn unstaged_modification() {
        assert_eq!(
            parse_status_entry(" M src/app.ts"),
            Some(change("src/app.ts", ChangeType::Modified, StageState::Unstaged))
        );
    }

    #[test]
    fn untracked_is_added_unstaged() {
        assert_eq!(
            parse_status_entry("?? new.txt"),
            Some(change("new.txt", ChangeType::Added, StageState::Unstaged))
        );
    }

    #[test]
    fn type_priority_added_over_deleted_over_modified() {
        // Added in index, then deleted in worktree.
        assert_eq!(
            parse_status_entry("AD gone.rs").unwrap().change_type,
            ChangeType::Added
        );
        assert_eq!(
            parse_status_entry("MD half.rs").unwrap().change_type,
            ChangeType::Deleted
        );
        assert_eq!(
            parse_status_entry("MM both.rs").unwrap(),
            change("both.rs", ChangeType::Modified, StageState::Staged)
        );
        assert_eq!(
            parse_status_entry(" D removed.rs").unwrap(),
            change("removed.rs", ChangeType::Deleted, StageState::Unstaged)
        );
    }

    #[test]
    fn rename_reports_new_path_and_skips_source() {
        assert_eq!(
            parse_status("R  new.rs\0old.rs\0 M other.rs\0"),
            vec![
                change("new.rs", ChangeType::Modified, StageState::Staged),
                change("other.rs", ChangeType::Modified, StageState::Unstaged),
            ]
        );
    }

    #[test]
    fn paths_are_taken_verbatim() {
        assert_eq!(
            parse_status_entry("?? with space.txt").unwrap().path,
            "with space.txt"
        );
        assert_eq!(parse_status_entry("?? a -> b").unwrap().path, "a -> b");
    }

    #[test]
    fn short_or_empty_lines_skipped() {
        assert_eq!(parse_status_entry(""), None);
        assert_eq!(parse_status_entry("M"), None);
        assert_eq!(parse_status_entry("M  "), None);
        assert_eq!(parse_status("M  a\0\0?? b\0").len(), 2);
    }

    #[tokio::test]
    async fn not_a_repo_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitReader::new();
        assert!(git.file_changes(dir.path()).await.is_empty());
        assert!(git.current_branch(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn missing_git_binary_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitReader::with_bin(PathBuf::from("/definitely/not/git"));
        assert!(git.file_changes(dir.path()).await.is_empty());
        assert!(git.current_branch(dir.path()).await.is_none());
    }

    async fn git(cwd: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Initialise a repo on branch `trunk` with one commit. `false` when git
    /// is missing or too old for `init -b`.
    async fn init_repo(dir: &Path) -> bool {
        if !git(dir, &["init", "-b", "trunk"]).await {
            return false;
        }
        git(dir, &["config", "user.email", "test@test.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        std::fs::write(dir.join("README"), "hi").unwrap();
        git(dir, &["add", "."]).await;
        git(dir, &["-c", "commit.gpgsign=false", "commit", "-m", "init"]).await
    }

    #[tokio::test]
    async fn real_repo_branch_and_changes() {
        let dir = tempfile::tempdir().unwrap();
        if !init_repo(dir.path()).await {
            return;
        }
        std::fs::write(dir.path().join("README"), "changed").unwrap();
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();

        let git = GitReader::new();
        assert_eq!(git.current_branch(dir.path()).await.as_deref(), Some("trunk"));
        let changes = git.file_changes(dir.path()).await;
        assert!(changes.contains(&change("README", ChangeType::Modified, StageState::Unstaged)));
        assert!(changes.contains(&change("new.txt", ChangeType::Added, StageState::Unstaged)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_repo_non_ascii_and_control_names() {
        let dir = tempfile::tempdir().unwrap();
        if !init_repo(dir.path()).await {
            return;
        }
        std::fs::write(dir.path().join("café.txt"), "x").unwrap();
        std::fs::write(dir.path().join("tab\there.txt"), "x").unwrap();

        let mut paths: Vec<String> = GitReader::new()
            .file_changes(dir.path())
            .await
            .into_iter()
            .map(|c| c.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["café.txt", "tab\there.txt"]);
    }

    #[tokio::test]
    async fn real_repo_rename_reports_destination() {
        let dir = tempfile::tempdir().unwrap();
        if !init_repo(dir.path()).await {
            return;
        }
        assert!(git(dir.path(), &["mv", "README", "README.md"]).await);

        let changes = GitReader::new().file_changes(dir.path()).await;
        assert_eq!(
            changes,
            vec![change("README.md", ChangeType::Modified, StageState::Staged)]
        );
    }
}

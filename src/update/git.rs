//! Git plumbing for the `CHECKING` phase (`spec.md` §4.4, §9 "commits
//! behind" supplement).
//!
//! Shells out to the system `git` binary via `tokio::process::Command`
//! rather than linking `git2`, mirroring the original Python
//! implementation's `subprocess.run(["git", ...])` calls.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {0} exited with status {1}: {2}")]
    CommandFailed(&'static str, i32, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitsBehind {
    pub behind: u32,
    pub ahead: u32,
}

async fn run_git(repo_dir: &Path, args: &[&str], label: &'static str) -> Result<String, GitError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .await?;

    if !output.status.success() {
        return Err(GitError::CommandFailed(
            label,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Current commit hash of `repo_dir`, used as the code half of a
/// [`super::snapshot::Snapshot`].
pub async fn current_commit(repo_dir: &Path) -> Result<String, GitError> {
    let out = run_git(repo_dir, &["rev-parse", "HEAD"], "rev-parse").await?;
    Ok(out.trim().to_string())
}

pub async fn checkout(repo_dir: &Path, commit_or_branch: &str) -> Result<(), GitError> {
    run_git(repo_dir, &["checkout", commit_or_branch], "checkout").await?;
    Ok(())
}

/// Fetches `remote` and parses `git status` to determine how many commits
/// the working tree is behind/ahead of `remote/branch`.
pub async fn commits_behind(
    repo_dir: &Path,
    remote: &str,
    branch: &str,
) -> Result<CommitsBehind, GitError> {
    run_git(repo_dir, &["fetch", remote, branch], "fetch").await?;
    let status = run_git(repo_dir, &["status", "-sb"], "status").await?;
    Ok(parse_commits_behind(&status))
}

fn behind_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"behind '[^']+' by (\d+) commit").expect("valid regex literal"))
}

fn diverged_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) and (\d+) different commits each").expect("valid regex literal"))
}

/// Parses the output of `git status -sb`, which on a tracking branch
/// contains phrases like `[behind 'origin/main' by 3 commits]` or
/// `[ahead 2, behind 3]`/`3 and 2 different commits each` depending on
/// git's locale and version. Returns `{behind: 0, ahead: 0}` when the
/// branch is up to date or the phrasing isn't recognised.
fn parse_commits_behind(status_output: &str) -> CommitsBehind {
    if let Some(caps) = diverged_re().captures(status_output) {
        let ahead: u32 = caps[1].parse().unwrap_or(0);
        let behind: u32 = caps[2].parse().unwrap_or(0);
        return CommitsBehind { behind, ahead };
    }

    if let Some(caps) = behind_only_re().captures(status_output) {
        let behind: u32 = caps[1].parse().unwrap_or(0);
        return CommitsBehind { behind, ahead: 0 };
    }

    CommitsBehind { behind: 0, ahead: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_behind_only_phrasing() {
        let status = "## main...origin/main [behind 'origin/main' by 3 commits]\n";
        assert_eq!(
            parse_commits_behind(status),
            CommitsBehind { behind: 3, ahead: 0 }
        );
    }

    #[test]
    fn parses_diverged_phrasing() {
        let status = "Your branch and 'origin/main' have diverged,\nand have 2 and 5 different commits each, respectively.\n";
        assert_eq!(
            parse_commits_behind(status),
            CommitsBehind { behind: 5, ahead: 2 }
        );
    }

    #[test]
    fn up_to_date_yields_zero() {
        let status = "## main...origin/main\n";
        assert_eq!(
            parse_commits_behind(status),
            CommitsBehind { behind: 0, ahead: 0 }
        );
    }
}

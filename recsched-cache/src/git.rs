//! Thin typed wrapper around the git commands the importer needs.
//!
//! Everything is shelled out: `rev-parse`, `rev-list`, `cat-file`, plus
//! `init`/`fetch` for the background fetcher. The first line of stderr
//! becomes the error message; "does not exist" responses from `cat-file`
//! map to a typed not-found error so the importer can classify them.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tokio::process::Command;

/// The git binary to invoke.
const GIT: &str = "git";

/// Result type alias using GitError
pub type Result<T> = std::result::Result<T, GitError>;

/// Git driver error type.
#[derive(Error, Debug)]
pub enum GitError {
    /// The requested file does not exist in the tree.
    #[error("not found: {0}")]
    NotFound(String),

    /// The command exited unsuccessfully.
    #[error("git: {0}")]
    Command(String),

    /// Command output could not be parsed.
    #[error("git: parse: {0}")]
    Parse(String),

    /// Spawning or reading the process failed.
    #[error("git: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the repository's git directory. Errors if `repo` is not a git
/// repository.
pub async fn git_dir(repo: &Path) -> Result<PathBuf> {
    let out = run(repo, &["rev-parse", "--absolute-git-dir"]).await?;
    Ok(PathBuf::from(String::from_utf8_lossy(&out).trim()))
}

/// Resolve `rev` to a full commit hash.
pub async fn rev_commit(repo: &Path, rev: &str) -> Result<String> {
    let spec = format!("{rev}^{{commit}}");
    let out = run(repo, &["rev-parse", "--verify", "--end-of-options", &spec]).await?;
    let hash = String::from_utf8_lossy(&out).trim().to_string();
    if !is_commit_hash(&hash) {
        return Err(GitError::Parse(format!("invalid commit hash {hash:?}")));
    }
    Ok(hash)
}

/// Read one file from a tree. A missing path is [`GitError::NotFound`].
pub async fn cat_file(repo: &Path, treeish: &str, path: &str) -> Result<Vec<u8>> {
    let spec = format!("{treeish}:{path}");
    match run(repo, &["cat-file", "blob", "--end-of-options", &spec]).await {
        Ok(out) => Ok(out),
        Err(GitError::Command(msg))
            if msg.contains(" does not exist in ")
                || msg.contains(" exists on disk, but not in ") =>
        {
            Err(GitError::NotFound(msg))
        }
        Err(e) => Err(e),
    }
}

/// List `(hash, commit date)` pairs from the oldest first-parent ancestor of
/// `rev` up to `rev` itself, ascending by commit date.
pub async fn commits_asc_first_parent(repo: &Path, rev: &str) -> Result<Vec<(String, DateTime<Utc>)>> {
    let out = run(
        repo,
        &[
            "rev-list",
            "--date-order",
            "--timestamp",
            "--first-parent",
            "--reverse",
            "--end-of-options",
            rev,
        ],
    )
    .await?;
    let text = String::from_utf8_lossy(&out);
    let mut commits = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(' ');
        let ts = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| GitError::Parse(format!("line {line:?}: invalid timestamp")))?;
        let hash = fields
            .next()
            .filter(|f| is_commit_hash(f))
            .ok_or_else(|| GitError::Parse(format!("line {line:?}: invalid commit hash")))?;
        if fields.next().is_some() {
            return Err(GitError::Parse(format!("line {line:?}: too many fields")));
        }
        let date = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| GitError::Parse(format!("line {line:?}: timestamp out of range")))?;
        commits.push((hash.to_string(), date));
    }
    Ok(commits)
}

/// Initialize a bare repository at `path`.
pub async fn init_bare(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let arg = path.to_string_lossy();
    run(parent, &["init", "--bare", arg.as_ref()]).await?;
    Ok(())
}

/// Fetch `branch` from `remote`, force-updating the local branch of the same
/// name. Output lines go to the log.
pub async fn fetch(repo: &Path, remote: &str, branch: &str) -> Result<()> {
    let refmap = format!("+refs/heads/{branch}:refs/heads/{branch}");
    let refspec = format!("refs/heads/{branch}");
    let out = run_allowing_output(
        repo,
        &[
            "fetch",
            "--verbose",
            "--no-write-fetch-head",
            "--refmap",
            &refmap,
            remote,
            &refspec,
        ],
    )
    .await?;
    for line in String::from_utf8_lossy(&out).lines() {
        if !line.is_empty() {
            tracing::info!("git fetch: {line}");
        }
    }
    Ok(())
}

/// True if `hash` is a full lowercase-hex commit hash.
pub fn is_commit_hash(hash: &str) -> bool {
    hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

async fn run(dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new(GIT)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(command_error(&output.status, &output.stderr));
    }
    Ok(output.stdout)
}

/// Like [`run`], but returns combined stdout+stderr on success (fetch writes
/// its progress to stderr).
async fn run_allowing_output(dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new(GIT)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(command_error(&output.status, &output.stderr));
    }
    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(combined)
}

fn command_error(status: &std::process::ExitStatus, stderr: &[u8]) -> GitError {
    let text = String::from_utf8_lossy(stderr);
    match text.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(first) => GitError::Command(format!("({status}): {first}")),
        None => GitError::Command(format!("({status})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_commit_hash() {
        assert!(is_commit_hash("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_hash("0123456789ABCDEF0123456789ABCDEF01234567"));
        assert!(!is_commit_hash("0123456789abcdef"));
        assert!(!is_commit_hash(
            "0123456789abcdef0123456789abcdef01234567ab"
        ));
        assert!(!is_commit_hash("g123456789abcdef0123456789abcdef01234567"));
    }
}

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{AppError, AppResult};
use crate::types::Remote;

/// Name of the version-control marker directory that identifies a repository.
pub const MARKER_DIR: &str = ".git";

/// Metadata read from a repository. Every field degrades independently: a
/// failed or timed-out query leaves its field empty instead of failing the
/// whole extraction.
#[derive(Debug, Clone, Default)]
pub struct GitMetadata {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub remotes: Vec<Remote>,
}

/// Thin wrapper around the external `git` executable. All invocations carry
/// a hard timeout and tolerate the binary being absent.
#[derive(Debug, Clone)]
pub struct GitClient {
    timeout: Duration,
}

impl GitClient {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout: Duration::from_millis(timeout_ms.max(1)) }
    }

    /// Marker-directory check; no subprocess involved.
    pub fn is_repo(dir: &Path) -> bool {
        dir.join(MARKER_DIR).is_dir()
    }

    /// Probes whether the git executable is callable at all.
    pub async fn is_available(&self) -> bool {
        self.run(Path::new("."), &["--version"]).await.is_some()
    }

    /// Reads branch, commit and remotes for `dir`. Never fails: a non-repo
    /// directory or an unusable git binary yields an empty result.
    pub async fn collect(&self, dir: &Path) -> GitMetadata {
        if !Self::is_repo(dir) {
            return GitMetadata::default();
        }
        let branch = self
            .run(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let commit = self
            .run(dir, &["rev-parse", "HEAD"])
            .await
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let remotes = match self.run(dir, &["remote", "-v"]).await {
            Some(listing) => parse_remote_listing(&listing),
            None => Vec::new(),
        };
        GitMetadata { branch, commit, remotes }
    }

    /// Checks out `branch` in `dir`. Refused with `UncommittedChanges` when
    /// the working tree is dirty, so the caller can prompt instead of losing
    /// local edits.
    pub async fn checkout_branch(&self, dir: &Path, branch: &str) -> AppResult<()> {
        if !Self::is_repo(dir) {
            return Err(AppError::NotFound(format!("no repository at {}", dir.display())));
        }
        let status = self
            .run(dir, &["status", "--porcelain"])
            .await
            .ok_or_else(|| AppError::Git("git status failed".to_string()))?;
        if !status.trim().is_empty() {
            return Err(AppError::UncommittedChanges(dir.display().to_string()));
        }
        let output = self.output(dir, &["checkout", branch]).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AppError::Git(format!("checkout {} failed: {}", branch, stderr.trim())))
        }
    }

    /// Runs git and returns stdout on success, `None` on any failure
    /// (missing binary, non-zero exit, timeout).
    async fn run(&self, dir: &Path, args: &[&str]) -> Option<String> {
        match self.output(dir, args).await {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).to_string()),
            Ok(out) => {
                tracing::debug!(
                    "git {:?} in {} exited {}",
                    args,
                    dir.display(),
                    out.status.code().unwrap_or(-1)
                );
                None
            }
            Err(e) => {
                tracing::debug!("git {:?} in {} failed: {}", args, dir.display(), e);
                None
            }
        }
    }

    async fn output(&self, dir: &Path, args: &[&str]) -> AppResult<std::process::Output> {
        let fut = Command::new("git")
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(AppError::Git(format!("failed to spawn git: {}", e))),
            Err(_) => {
                tracing::warn!("git {:?} in {} timed out after {:?}", args, dir.display(), self.timeout);
                Err(AppError::Git(format!("git {:?} timed out", args)))
            }
        }
    }
}

/// Parses `git remote -v` output. The listing reports two lines per remote
/// (fetch and push); only the fetch line is authoritative and duplicate
/// names collapse to the first entry, preserving discovery order.
pub fn parse_remote_listing(listing: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();
    for line in listing.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Some(kind) = parts.next() {
            if kind != "(fetch)" {
                continue;
            }
        }
        if remotes.iter().any(|r| r.name == name) {
            continue;
        }
        remotes.push(build_remote(name, url));
    }
    remotes
}

fn build_remote(name: &str, url: &str) -> Remote {
    let parsed = parse_remote_url(url);
    Remote {
        name: name.to_string(),
        url: url.to_string(),
        provider: parsed.as_ref().and_then(|p| p.provider.clone()),
        owner: parsed.as_ref().map(|p| p.owner.clone()),
        repo: parsed.as_ref().map(|p| p.repo.clone()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRemoteUrl {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub provider: Option<String>,
}

/// Recognizes SSH (`user@host:owner/repo[.git]`) and HTTPS
/// (`scheme://host/owner/repo[.git]`) remote URL shapes.
pub fn parse_remote_url(url: &str) -> Option<ParsedRemoteUrl> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let (host, rest) = if let Some((_scheme, tail)) = url.split_once("://") {
        // HTTPS-like: host/owner/repo
        let (host, path) = tail.split_once('/')?;
        // Credentials in the authority are not part of the host
        let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
        (host, path)
    } else if let Some((user_host, path)) = url.split_once(':') {
        // SSH-like: user@host:owner/repo
        let host = user_host.rsplit_once('@').map(|(_, h)| h).unwrap_or(user_host);
        (host, path)
    } else {
        return None;
    };

    let host = host.split(':').next().unwrap_or(host);
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(ParsedRemoteUrl {
        provider: provider_for_host(host),
        host: host.to_string(),
        owner,
        repo,
    })
}

/// Classifies a host into the small fixed provider set by substring match.
pub fn provider_for_host(host: &str) -> Option<String> {
    let host = host.to_ascii_lowercase();
    for provider in ["github", "gitlab", "bitbucket"] {
        if host.contains(provider) {
            return Some(provider.to_string());
        }
    }
    None
}

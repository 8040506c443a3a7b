//! Data-source contract for repository views
//!
//! The views never run version-control commands themselves. Everything they
//! show comes from an injected `RepositorySource`, which also provides the
//! change streams the views subscribe to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vista_watcher::{RepositoryChange, RepositorySetChanged};

/// One open repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Root path, as reported by the source
    pub path: String,
    /// Monotonic position assigned when the repository was opened
    pub index: usize,
    /// Display name; the last path segment when empty
    #[serde(default)]
    pub name: String,
}

impl RepositoryInfo {
    pub fn new(path: impl Into<String>, index: usize) -> Self {
        let path = path.into();
        let name = default_name(&path);
        Self { path, index, name }
    }

    /// Name to display
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            default_name(&self.path)
        } else {
            self.name.clone()
        }
    }

    /// Identity key for reconciliation and node ids
    pub fn key(&self) -> String {
        normalize_path(&self.path)
    }
}

fn default_name(path: &str) -> String {
    let normalized = normalize_path(path);
    normalized
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(normalized.as_str())
        .to_string()
}

/// Stable form of a repository path
///
/// Separators become `/` and trailing separators are dropped, so the same
/// repository reported as `C:\repo\` and `C:/repo` maps to one key.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    if trimmed.is_empty() && !unified.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `path` lies inside the repository rooted at `root`
pub fn is_within(root: &str, path: &str) -> bool {
    let root = normalize_path(root);
    let path = normalize_path(path);
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    /// Checked-out branch
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default)]
    pub ahead: usize,
    #[serde(default)]
    pub behind: usize,
}

impl BranchInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: false,
            upstream: None,
            ahead: 0,
            behind: 0,
        }
    }

    pub fn current(mut self) -> Self {
        self.current = true;
        self
    }
}

/// Working-tree summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSummary {
    /// Checked-out branch, `None` when detached
    pub branch: Option<String>,
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
    pub conflicts: usize,
}

impl StatusSummary {
    pub fn changed(&self) -> usize {
        self.staged + self.unstaged + self.untracked + self.conflicts
    }

    pub fn is_clean(&self) -> bool {
        self.changed() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
}

impl CommitInfo {
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }

    /// First line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A window of a branch's history, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPage {
    pub commits: Vec<CommitInfo>,
    /// Older commits exist beyond this page
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Single-letter code shown next to the file
    pub fn code(&self) -> &'static str {
        match self {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
            FileStatus::Renamed => "R",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root
    pub path: String,
    pub status: FileStatus,
}

/// Everything the repository views read from the outside world
#[async_trait]
pub trait RepositorySource: Send + Sync + 'static {
    /// Open repositories, in any order
    async fn repositories(&self) -> anyhow::Result<Vec<RepositoryInfo>>;

    async fn status(&self, repo: &str) -> anyhow::Result<StatusSummary>;

    async fn branches(&self, repo: &str) -> anyhow::Result<Vec<BranchInfo>>;

    /// Newest-first history of `branch`, at most `limit` commits
    async fn commits(
        &self,
        repo: &str,
        branch: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<CommitPage>;

    async fn commit_files(&self, repo: &str, sha: &str) -> anyhow::Result<Vec<FileChange>>;

    /// When the repository last fetched from its remotes
    async fn last_fetched(&self, repo: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Stream of repository-set changes
    fn watch_repositories(&self) -> broadcast::Receiver<RepositorySetChanged>;

    /// Stream of changes for one repository
    fn watch_repository(&self, repo: &str) -> anyhow::Result<broadcast::Receiver<RepositoryChange>>;
}

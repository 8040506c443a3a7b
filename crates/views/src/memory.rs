//! In-memory repository source
//!
//! Backs the tests and the CLI fixtures. Mutators emit the same change
//! events a real source would, so views react to them exactly as they would
//! in a host.

use crate::source::{
    normalize_path, BranchInfo, CommitInfo, CommitPage, FileChange, RepositoryInfo,
    RepositorySource, StatusSummary,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use vista_watcher::{ChangeReason, RepositoryChange, RepositorySetChanged};

const CHANNEL_CAPACITY: usize = 64;

/// Full state of one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryData {
    pub path: String,
    pub name: Option<String>,
    pub status: StatusSummary,
    pub branches: Vec<BranchData>,
    pub last_fetched: Option<DateTime<Utc>>,
}

impl RepositoryData {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn branch(mut self, branch: BranchData) -> Self {
        self.branches.push(branch);
        self
    }

    fn find_branch(&self, name: &str) -> Option<&BranchData> {
        self.branches.iter().find(|b| b.info.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchData {
    #[serde(flatten)]
    pub info: BranchInfo,
    /// Newest first
    #[serde(default)]
    pub commits: Vec<CommitData>,
}

impl BranchData {
    pub fn new(info: BranchInfo) -> Self {
        Self {
            info,
            commits: Vec::new(),
        }
    }

    pub fn commit(mut self, commit: CommitData) -> Self {
        self.commits.push(commit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    #[serde(flatten)]
    pub info: CommitInfo,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

impl CommitData {
    pub fn new(info: CommitInfo) -> Self {
        Self {
            info,
            files: Vec::new(),
        }
    }
}

struct Entry {
    info: RepositoryInfo,
    data: RepositoryData,
}

/// Repository source holding everything in memory
pub struct InMemorySource {
    repositories: RwLock<Vec<Entry>>,
    next_index: AtomicUsize,
    set_changes: broadcast::Sender<RepositorySetChanged>,
    /// Per-repository change channels, keyed by normalized path
    repository_changes: DashMap<String, broadcast::Sender<RepositoryChange>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        let (set_changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            repositories: RwLock::new(Vec::new()),
            next_index: AtomicUsize::new(0),
            set_changes,
            repository_changes: DashMap::new(),
        }
    }

    /// Source pre-populated with `repositories`, indexed in order
    pub fn with_repositories(repositories: impl IntoIterator<Item = RepositoryData>) -> Self {
        let source = Self::new();
        for data in repositories {
            source.insert(data);
        }
        source
    }

    fn insert(&self, data: RepositoryData) -> Option<RepositoryInfo> {
        let key = normalize_path(&data.path);
        let mut repositories = self.repositories.write();
        if repositories.iter().any(|e| e.info.key() == key) {
            return None;
        }

        let mut info = RepositoryInfo::new(data.path.clone(), self.next_index.fetch_add(1, Ordering::SeqCst));
        if let Some(name) = &data.name {
            info.name = name.clone();
        }
        repositories.push(Entry {
            info: info.clone(),
            data,
        });
        Some(info)
    }

    /// Open a repository; returns `None` when it is already open
    pub fn open_repository(&self, data: RepositoryData) -> Option<RepositoryInfo> {
        let info = self.insert(data)?;
        debug!("Opened repository {} (index {})", info.path, info.index);
        let _ = self.set_changes.send(RepositorySetChanged {
            added: vec![info.path.clone()],
            removed: Vec::new(),
        });
        Some(info)
    }

    /// Close a repository; returns false when it was not open
    pub fn close_repository(&self, path: &str) -> bool {
        let key = normalize_path(path);
        let removed = {
            let mut repositories = self.repositories.write();
            let before = repositories.len();
            repositories.retain(|e| e.info.key() != key);
            before != repositories.len()
        };

        if removed {
            debug!("Closed repository {}", path);
            self.repository_changes.remove(&key);
            let _ = self.set_changes.send(RepositorySetChanged {
                added: Vec::new(),
                removed: vec![path.to_string()],
            });
        }
        removed
    }

    /// Edit a repository in place and report `reasons` for it
    pub fn update_repository<F>(&self, path: &str, reasons: &[ChangeReason], edit: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut RepositoryData),
    {
        let key = normalize_path(path);
        {
            let mut repositories = self.repositories.write();
            let entry = repositories
                .iter_mut()
                .find(|e| e.info.key() == key)
                .ok_or_else(|| anyhow!("repository {} is not open", path))?;
            edit(&mut entry.data);
        }

        self.notify_change(path, reasons);
        Ok(())
    }

    /// Report a change without editing anything
    pub fn notify_change(&self, path: &str, reasons: &[ChangeReason]) {
        let key = normalize_path(path);
        if let Some(sender) = self.repository_changes.get(&key) {
            trace!("Repository {} changed: {:?}", path, reasons);
            let _ = sender.send(RepositoryChange::new(path, reasons.iter().copied()));
        }
    }

    /// Snapshot of every repository, in index order
    pub fn snapshot(&self) -> Vec<RepositoryData> {
        let repositories = self.repositories.read();
        let mut entries: Vec<_> = repositories.iter().map(|e| (e.info.index, e.data.clone())).collect();
        entries.sort_by_key(|(index, _)| *index);
        entries.into_iter().map(|(_, data)| data).collect()
    }

    fn with_repository<T>(&self, path: &str, read: impl FnOnce(&RepositoryData) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let key = normalize_path(path);
        let repositories = self.repositories.read();
        let entry = repositories
            .iter()
            .find(|e| e.info.key() == key)
            .ok_or_else(|| anyhow!("repository {} is not open", path))?;
        read(&entry.data)
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositorySource for InMemorySource {
    async fn repositories(&self) -> anyhow::Result<Vec<RepositoryInfo>> {
        Ok(self.repositories.read().iter().map(|e| e.info.clone()).collect())
    }

    async fn status(&self, repo: &str) -> anyhow::Result<StatusSummary> {
        self.with_repository(repo, |data| {
            let mut status = data.status.clone();
            if status.branch.is_none() {
                status.branch = data
                    .branches
                    .iter()
                    .find(|b| b.info.current)
                    .map(|b| b.info.name.clone());
            }
            Ok(status)
        })
    }

    async fn branches(&self, repo: &str) -> anyhow::Result<Vec<BranchInfo>> {
        self.with_repository(repo, |data| {
            Ok(data.branches.iter().map(|b| b.info.clone()).collect())
        })
    }

    async fn commits(
        &self,
        repo: &str,
        branch: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<CommitPage> {
        self.with_repository(repo, |data| {
            let branch = data
                .find_branch(branch)
                .with_context(|| format!("branch {} not found in {}", branch, repo))?;

            let total = branch.commits.len();
            let take = limit.unwrap_or(total).min(total);
            Ok(CommitPage {
                commits: branch.commits[..take].iter().map(|c| c.info.clone()).collect(),
                has_more: take < total,
            })
        })
    }

    async fn commit_files(&self, repo: &str, sha: &str) -> anyhow::Result<Vec<FileChange>> {
        self.with_repository(repo, |data| {
            data.branches
                .iter()
                .flat_map(|b| b.commits.iter())
                .find(|c| c.info.sha == sha)
                .map(|c| c.files.clone())
                .with_context(|| format!("commit {} not found in {}", sha, repo))
        })
    }

    async fn last_fetched(&self, repo: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.with_repository(repo, |data| Ok(data.last_fetched))
    }

    fn watch_repositories(&self) -> broadcast::Receiver<RepositorySetChanged> {
        self.set_changes.subscribe()
    }

    fn watch_repository(&self, repo: &str) -> anyhow::Result<broadcast::Receiver<RepositoryChange>> {
        let key = normalize_path(repo);
        self.with_repository(repo, |_| Ok(()))?;

        let sender = self
            .repository_changes
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

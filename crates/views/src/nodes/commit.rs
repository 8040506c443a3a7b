//! Commit rows under a branch

use super::{commands, contexts, relative_time, FileNode, SourceRef};
use crate::source::CommitInfo;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::debug;
use vista_core::{
    Collapsible, CommandDescriptor, DisplayRecord, MessageNode, NodeBase, NodeRef, NodeState,
    RefreshOutcome, TreeContext, ViewError, ViewNode, WeakNodeRef,
};

pub struct CommitNode {
    me: Weak<CommitNode>,
    base: NodeBase,
    source: SourceRef,
    repo: String,
    commit: RwLock<CommitInfo>,
}

impl CommitNode {
    /// Commit row under `parent_id`; its id is `<parent_id>/<sha>`
    pub fn new(
        parent_id: &str,
        repo: impl Into<String>,
        commit: CommitInfo,
        source: SourceRef,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        let id = format!("{}/{}", parent_id, commit.sha);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: NodeBase::new(id, Some(parent), context),
            source,
            repo: repo.into(),
            commit: RwLock::new(commit),
        })
    }

    pub fn sha(&self) -> String {
        self.commit.read().sha.clone()
    }

    pub fn commit(&self) -> CommitInfo {
        self.commit.read().clone()
    }

    /// Take the latest data for the same sha (e.g. a refreshed author date)
    pub fn update(&self, commit: CommitInfo) {
        *self.commit.write() = commit;
    }

    async fn load(&self) -> vista_core::Result<Vec<NodeRef>> {
        let sha = self.sha();
        let mut files = self
            .source
            .commit_files(&self.repo, &sha)
            .await
            .map_err(|e| ViewError::compute(self.id(), e))?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("{}: {} changed files", self.id(), files.len());

        let parent: WeakNodeRef = self.me.clone();
        if files.is_empty() {
            let message: NodeRef = MessageNode::new(
                self.id(),
                "No files changed",
                Some(parent),
                self.base.context().clone(),
            );
            return Ok(vec![message]);
        }

        Ok(files
            .into_iter()
            .map(|change| {
                FileNode::new(
                    self.id(),
                    self.repo.as_str(),
                    sha.as_str(),
                    change,
                    parent.clone(),
                    self.base.context().clone(),
                ) as NodeRef
            })
            .collect())
    }
}

#[async_trait]
impl ViewNode for CommitNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> vista_core::Result<Vec<NodeRef>> {
        self.base.cache().get_or_load(|| self.load()).await
    }

    async fn display_record(&self) -> vista_core::Result<DisplayRecord> {
        let commit = self.commit();
        Ok(
            DisplayRecord::new(self.id(), commit.summary(), Collapsible::Collapsed)
                .description(format!(
                    "{}, {}",
                    commit.author,
                    relative_time(commit.date, Utc::now())
                ))
                .tooltip(format!("{}\n{}", commit.short_sha(), commit.message))
                .icon("commit")
                .context_value(contexts::COMMIT)
                .command(
                    CommandDescriptor::new(commands::SHOW_COMMIT)
                        .arg(self.repo.as_str())
                        .arg(commit.sha.as_str()),
                ),
        )
    }

    async fn refresh(&self, reset: bool) -> vista_core::Result<RefreshOutcome> {
        // A commit's files never change; only a reset drops them
        if reset {
            self.base.reset_children();
        }
        Ok(RefreshOutcome::Propagate)
    }

    fn dispose(&self) {
        self.base.dispose();
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }
}

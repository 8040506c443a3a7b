//! Branch rows: a pageable window over the branch's history
//!
//! The window starts at the remembered limit for this branch (or the
//! configured page size) and grows through `show_more`. When more history
//! exists a trailing "load more" row is shown. Commit nodes are reused by
//! sha when the window is re-read, so growing the window never rebuilds the
//! rows the user already sees.

use super::{commands, contexts, CommitNode, SourceRef};
use crate::settings::ViewSettings;
use crate::source::BranchInfo;
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use vista_core::{
    id_segment, same_node, Collapsible, CommandDescriptor, DisplayRecord, MessageNode, NodeBase,
    NodeRef, NodeState, PageRequest, Pageable, PagingState, RefreshOutcome, TreeContext,
    ViewError, ViewNode, WeakNodeRef,
};

pub struct BranchNode {
    me: Weak<BranchNode>,
    base: NodeBase,
    source: SourceRef,
    settings: Arc<ViewSettings>,
    repo: String,
    info: RwLock<BranchInfo>,
    paging: PagingState,
    /// Commit rows of the current window, newest first
    commits: Mutex<Vec<Arc<CommitNode>>>,
}

impl BranchNode {
    /// Branch row under `parent_id`; its id is `<parent_id>/<name>`
    pub fn new(
        parent_id: &str,
        repo: impl Into<String>,
        info: BranchInfo,
        source: SourceRef,
        settings: Arc<ViewSettings>,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        let id = format!("{}/{}", parent_id, id_segment(&info.name));
        let paging = PagingState::new(context.initial_limit(&id, Some(settings.page_size)));

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: NodeBase::new(id, Some(parent), context),
            source,
            settings,
            repo: repo.into(),
            info: RwLock::new(info),
            paging,
            commits: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    pub fn info(&self) -> BranchInfo {
        self.info.read().clone()
    }

    pub fn update(&self, info: BranchInfo) {
        *self.info.write() = info;
    }

    /// Commit rows of the current window
    pub fn commits(&self) -> Vec<Arc<CommitNode>> {
        self.commits.lock().clone()
    }

    /// Read the current window, reusing commit rows by sha
    async fn build(&self) -> vista_core::Result<Vec<NodeRef>> {
        let page = self
            .source
            .commits(&self.repo, &self.name(), self.paging.limit())
            .await
            .map_err(|e| ViewError::compute(self.id(), e))?;
        self.paging.set_has_more(page.has_more);

        let mut previous: AHashMap<String, Arc<CommitNode>> = std::mem::take(&mut *self.commits.lock())
            .into_iter()
            .filter(|commit| !commit.is_disposed())
            .map(|commit| (commit.sha(), commit))
            .collect();

        let parent: WeakNodeRef = self.me.clone();
        let mut commits = Vec::with_capacity(page.commits.len());
        for info in page.commits {
            match previous.remove(&info.sha) {
                Some(existing) => {
                    existing.update(info);
                    commits.push(existing);
                }
                None => commits.push(CommitNode::new(
                    self.id(),
                    self.repo.as_str(),
                    info,
                    self.source.clone(),
                    parent.clone(),
                    self.base.context().clone(),
                )),
            }
        }
        for (_, stale) in previous {
            stale.dispose();
        }

        trace!(
            "{}: window of {} commits (more: {})",
            self.id(),
            commits.len(),
            page.has_more
        );

        let mut children: Vec<NodeRef> = commits.iter().map(|c| c.clone() as NodeRef).collect();
        *self.commits.lock() = commits;

        if children.is_empty() {
            children.push(MessageNode::new(
                self.id(),
                "No commits could be found.",
                Some(parent),
                self.base.context().clone(),
            ));
        } else if page.has_more {
            children.push(LoadMoreNode::new(
                self.id(),
                self.settings.page_size,
                parent,
                self.base.context().clone(),
            ));
        }
        Ok(children)
    }

    /// Re-read the window in place when it is materialized
    async fn reload(&self) -> vista_core::Result<()> {
        let _guard = self.base.cache().transition().await;
        if self.base.cache().peek().is_none() {
            // The next get_children reads the new window
            return Ok(());
        }

        let children = self.build().await?;
        if let Some(old) = self.base.cache().replace(children.clone()) {
            for node in old {
                if !children.iter().any(|c| same_node(c, &node)) {
                    node.dispose();
                }
            }
        }
        Ok(())
    }

    /// Grow the window page by page until `sha` is inside it
    async fn grow_until(&self, sha: &str) -> vista_core::Result<()> {
        let name = self.name();
        let mut loaded = self.commits.lock().len();

        loop {
            let limit = self.paging.grow(self.settings.page_size, loaded);
            let page = self
                .source
                .commits(&self.repo, &name, limit)
                .await
                .map_err(|e| ViewError::compute(self.id(), e))?;

            if page.commits.iter().any(|c| c.sha == sha) || !page.has_more {
                return Ok(());
            }
            loaded = page.commits.len();
        }
    }
}

#[async_trait]
impl ViewNode for BranchNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> vista_core::Result<Vec<NodeRef>> {
        self.base.cache().get_or_load(|| self.build()).await
    }

    async fn display_record(&self) -> vista_core::Result<DisplayRecord> {
        let info = self.info();
        let collapsible = if info.current && self.settings.expand_current_branch {
            Collapsible::Expanded
        } else {
            Collapsible::Collapsed
        };

        let mut record = DisplayRecord::new(self.id(), info.name.as_str(), collapsible);
        record = if info.current {
            record.icon("branch-current").context_value(contexts::BRANCH_CURRENT)
        } else {
            record.icon("branch").context_value(contexts::BRANCH)
        };

        if let Some(upstream) = &info.upstream {
            let mut description = upstream.clone();
            if info.ahead > 0 {
                description.push_str(&format!(" {}↑", info.ahead));
            }
            if info.behind > 0 {
                description.push_str(&format!(" {}↓", info.behind));
            }
            record = record
                .description(description)
                .tooltip(format!("{} is tracking {}", info.name, upstream));
        }
        Ok(record)
    }

    async fn refresh(&self, reset: bool) -> vista_core::Result<RefreshOutcome> {
        if self.base.is_disposed() {
            return Ok(RefreshOutcome::Skip);
        }

        if reset {
            // Waits out an in-flight reload so it cannot install the old window
            let _guard = self.base.cache().transition().await;
            let limit = self
                .base
                .context()
                .initial_limit(self.id(), Some(self.settings.page_size));
            self.paging.set_limit(limit);
            self.commits.lock().clear();
            self.base.reset_children();
            return Ok(RefreshOutcome::Propagate);
        }

        self.reload().await?;
        Ok(RefreshOutcome::Propagate)
    }

    fn dispose(&self) {
        if self.base.dispose() {
            self.commits.lock().clear();
        }
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }

    fn as_pageable(&self) -> Option<&dyn Pageable> {
        Some(self)
    }
}

#[async_trait]
impl Pageable for BranchNode {
    fn limit(&self) -> Option<usize> {
        self.paging.limit()
    }

    fn has_more(&self) -> bool {
        self.paging.has_more()
    }

    async fn show_more(&self, request: PageRequest) -> vista_core::Result<()> {
        if self.base.is_disposed() {
            return Err(ViewError::Disposed(self.id().to_string()));
        }

        match request {
            PageRequest::Count(count) => {
                let loaded = self.commits.lock().len();
                self.paging.grow(count, loaded);
            }
            PageRequest::Until(sha) => self.grow_until(&sha).await?,
            PageRequest::All => self.paging.unbounded(),
        }

        debug!("{}: showing {:?} commits", self.id(), self.paging.limit());
        self.reload().await
    }
}

/// Trailing row of a branch window that has more history
pub struct LoadMoreNode {
    base: NodeBase,
    /// Id of the branch this row pages
    branch_id: String,
    page_size: usize,
}

impl LoadMoreNode {
    pub fn new(
        branch_id: &str,
        page_size: usize,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(format!("{}/more", branch_id), Some(parent), context),
            branch_id: branch_id.to_string(),
            page_size,
        })
    }
}

#[async_trait]
impl ViewNode for LoadMoreNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> vista_core::Result<Vec<NodeRef>> {
        Ok(Vec::new())
    }

    async fn display_record(&self) -> vista_core::Result<DisplayRecord> {
        Ok(
            DisplayRecord::new(self.id(), "Load more commits...", Collapsible::None)
                .description(format!("{} more", self.page_size))
                .icon("unfold")
                .context_value(contexts::LOAD_MORE)
                .command(
                    CommandDescriptor::new(commands::SHOW_MORE)
                        .arg(self.branch_id.as_str())
                        .arg(self.page_size),
                ),
        )
    }

    fn dispose(&self) {
        self.base.dispose();
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }
}

//! Repository rows
//!
//! A repository row listens to its repository's change reasons, but only
//! once it is actually used (rendered, expanded or asked for children).
//! Changes are debounced and coalesced, then mapped to the cheapest refresh
//! that covers them:
//! - `config`: the binding itself may be stale, so unsubscribe and reset
//! - `heads` / `remotes` / `unknown`: reconcile branches in place
//! - `index`: only the status row and description change

use super::{
    branches_container, contexts, relative_time, BranchesNode, BranchesSource, SourceRef,
    StatusNode,
};
use crate::settings::ViewSettings;
use crate::source::RepositoryInfo;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};
use vista_core::{
    id_segment, Collapsible, DisplayRecord, NodeBase, NodeRef, NodeState, RefreshOutcome,
    Subscribeable, Subscription, SubscriptionHandle, TreeContext, ViewError, ViewNode, WeakNodeRef,
};
use vista_watcher::{ChangeAggregator, ChangeReason, RepositoryChange};

pub struct RepositoryNode {
    me: Weak<RepositoryNode>,
    base: NodeBase,
    source: SourceRef,
    settings: Arc<ViewSettings>,
    info: RwLock<RepositoryInfo>,
    branches: Mutex<Option<Arc<BranchesNode>>>,
    subscription: SubscriptionHandle,
}

impl RepositoryNode {
    /// Repository row under `parent_id`; its id is `<parent_id>/<escaped path>`
    pub fn new(
        parent_id: &str,
        info: RepositoryInfo,
        source: SourceRef,
        settings: Arc<ViewSettings>,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        let id = format!("{}/{}", parent_id, id_segment(&info.key()));
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: NodeBase::new(id, Some(parent), context),
            source,
            settings,
            info: RwLock::new(info),
            branches: Mutex::new(None),
            subscription: SubscriptionHandle::new(),
        })
    }

    pub fn path(&self) -> String {
        self.info.read().path.clone()
    }

    pub fn info(&self) -> RepositoryInfo {
        self.info.read().clone()
    }

    /// Take the latest data (index, name) for the same repository
    pub fn update(&self, info: RepositoryInfo) {
        *self.info.write() = info;
    }

    /// Branches container, once children were materialized
    pub fn branches(&self) -> Option<Arc<BranchesNode>> {
        self.branches.lock().clone()
    }

    async fn load(&self) -> vista_core::Result<Vec<NodeRef>> {
        let path = self.path();
        let parent: WeakNodeRef = self.me.clone();
        let mut children: Vec<NodeRef> = Vec::with_capacity(2);

        if self.settings.show_status {
            children.push(StatusNode::new(
                self.id(),
                path.as_str(),
                self.source.clone(),
                parent.clone(),
                self.base.context().clone(),
            ));
        }

        let branches = branches_container(
            self.id(),
            BranchesSource::new(self.source.clone(), self.settings.clone(), path),
            parent,
            self.base.context().clone(),
        );
        *self.branches.lock() = Some(branches.clone());
        children.push(branches);

        Ok(children)
    }

    /// React to a coalesced change of this repository
    pub async fn on_repository_changed(self: Arc<Self>, change: RepositoryChange) {
        if self.base.is_disposed() {
            return;
        }
        debug!("{}: changed ({})", self.id(), change.reasons);

        let outcome = if change.changed(&[ChangeReason::Config]) {
            self.unsubscribe();
            self.refresh(true).await
        } else if change.changed(&[ChangeReason::Heads, ChangeReason::Remotes, ChangeReason::Unknown]) {
            self.refresh(false).await
        } else {
            // Index changes only affect what is read at render time
            Ok(RefreshOutcome::Propagate)
        };

        match outcome {
            Ok(RefreshOutcome::Propagate) => {
                let node: NodeRef = self.clone();
                self.base.context().notify_node(node);
            }
            Ok(RefreshOutcome::Skip) => {}
            Err(e) => warn!("{}: refresh after change failed: {}", self.id(), e),
        }
    }
}

#[async_trait]
impl ViewNode for RepositoryNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> vista_core::Result<Vec<NodeRef>> {
        self.ensure_subscribed();
        self.base.cache().get_or_load(|| self.load()).await
    }

    async fn display_record(&self) -> vista_core::Result<DisplayRecord> {
        self.ensure_subscribed();

        let info = self.info();
        let (status, fetched) = futures::join!(
            self.source.status(&info.path),
            self.source.last_fetched(&info.path)
        );
        let status = status.map_err(|e| ViewError::compute(self.id(), e))?;

        let mut description = status.branch.clone().unwrap_or_else(|| "detached".to_string());
        if !status.is_clean() {
            description.push_str(" *");
        }
        match fetched {
            Ok(Some(at)) => {
                description.push_str(&format!(" • fetched {}", relative_time(at, Utc::now())));
            }
            Ok(None) => {}
            Err(e) => trace!("{}: no fetch time: {}", self.id(), e),
        }

        Ok(
            DisplayRecord::new(self.id(), info.display_name(), Collapsible::Collapsed)
                .description(description)
                .tooltip(info.path.clone())
                .icon("repo")
                .context_value(contexts::REPOSITORY),
        )
    }

    async fn refresh(&self, reset: bool) -> vista_core::Result<RefreshOutcome> {
        if self.base.is_disposed() {
            return Ok(RefreshOutcome::Skip);
        }

        if reset {
            let _guard = self.base.cache().transition().await;
            self.branches.lock().take();
            self.base.reset_children();
            return Ok(RefreshOutcome::Propagate);
        }

        let branches = self.branches();
        if let Some(branches) = branches {
            branches.refresh(false).await?;
        }
        Ok(RefreshOutcome::Propagate)
    }

    fn dispose(&self) {
        if self.base.dispose() {
            self.subscription.dispose();
            self.branches.lock().take();
        }
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }

    fn as_subscribeable(&self) -> Option<&dyn Subscribeable> {
        Some(self)
    }
}

impl Subscribeable for RepositoryNode {
    fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    fn subscribe(&self) -> vista_core::Result<Subscription> {
        let path = self.path();
        let mut rx = self
            .source
            .watch_repository(&path)
            .map_err(|e| ViewError::subscription(self.id(), e))?;

        let node = self.me.clone();
        let aggregator = Arc::new(ChangeAggregator::spawn(
            self.id(),
            self.settings.debounce(),
            move |batch: Vec<RepositoryChange>| {
                let Some(node) = node.upgrade() else {
                    return;
                };
                for change in RepositoryChange::coalesce(batch) {
                    tokio::spawn(node.clone().on_repository_changed(change));
                }
            },
        ));

        let forward = aggregator.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if !forward.push(change) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{}: missed {} change events", path, skipped);
                        forward.push(RepositoryChange::new(path.clone(), [ChangeReason::Unknown]));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        debug!("{}: subscribed to repository changes", self.id());
        Ok(Subscription::new(move || {
            task.abort();
            aggregator.dispose();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BranchData, InMemorySource, RepositoryData};
    use crate::source::BranchInfo;
    use vista_core::{same_node, TreeOptions};

    fn repository(context: &TreeContext) -> Arc<RepositoryNode> {
        let source = InMemorySource::with_repositories([
            RepositoryData::new("/r1").branch(BranchData::new(BranchInfo::new("main").current()))
        ]);
        let info = RepositoryInfo::new("/r1", 0);
        let orphan: WeakNodeRef = Weak::<RepositoryNode>::new();
        RepositoryNode::new(
            "repositories",
            info,
            Arc::new(source),
            Arc::new(ViewSettings::default()),
            orphan,
            context.clone(),
        )
    }

    #[tokio::test]
    async fn test_reset_waits_for_transition() {
        let context = TreeContext::new(TreeOptions::default());
        let node = repository(&context);
        let children = node.get_children().await.unwrap();
        assert_eq!(children.len(), 2);

        let guard = node.base.cache().transition().await;
        let reset = tokio::spawn({
            let node = node.clone();
            async move { node.refresh(true).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(node.state(), NodeState::Loaded);
        assert!(!children[1].is_disposed());

        drop(guard);
        reset.await.unwrap().unwrap();

        assert_eq!(node.state(), NodeState::Stale);
        assert!(children[1].is_disposed());
        assert!(node.branches().is_none());
    }

    #[tokio::test]
    async fn test_reset_rebuilds_branches() {
        let context = TreeContext::new(TreeOptions::default());
        let node = repository(&context);
        let before = node.get_children().await.unwrap();

        node.refresh(true).await.unwrap();
        let after = node.get_children().await.unwrap();

        assert_eq!(after[1].id(), "repositories/%2Fr1/branches");
        assert!(!same_node(&before[1], &after[1]));
    }
}

//! Containers mirroring a live external collection
//!
//! A `ReconcilingContainerNode` keeps its children in sync with whatever its
//! `ContainerSource` currently reports while preserving node identity:
//! children are matched by a stable key (never by object identity), matched
//! instances survive the refresh together with their subscription, new
//! items get new nodes and vanished items are disposed.
//!
//! An empty collection is rendered as a single placeholder message; going
//! from "empty" to "still empty" is a no-op so the host does not flicker.
//!
//! Sources may opt into *splatting*: when exactly one child exists its
//! children are shown in its place. Paging state is not carried across a
//! nested/splatted transition.

use crate::context::TreeContext;
use crate::error::{Result, ViewError};
use crate::message::MessageNode;
use crate::node::{
    same_node, DisplayRecord, NodeBase, NodeRef, NodeState, RefreshOutcome, ViewNode, WeakNodeRef,
};
use crate::subscription::{Subscribeable, Subscription, SubscriptionHandle};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Callback a source invokes when its collection changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// External collection backing a container
#[async_trait]
pub trait ContainerSource: Send + Sync + 'static {
    /// One entry of the external collection
    type Item: Send + 'static;
    /// Node kind built for each entry
    type Child: ViewNode + 'static;

    /// Current collection, in any order
    async fn fetch(&self) -> anyhow::Result<Vec<Self::Item>>;

    /// Stable ordering key (e.g. an assigned index)
    fn order(&self, item: &Self::Item) -> usize;

    /// Stable identity key (e.g. a normalized path)
    fn key(&self, item: &Self::Item) -> String;

    /// Build the node for a new entry
    fn create(
        &self,
        item: Self::Item,
        parent_id: &str,
        parent: WeakNodeRef,
        context: &TreeContext,
    ) -> Arc<Self::Child>;

    /// Hand the latest entry to a kept child
    fn update(&self, _child: &Arc<Self::Child>, _item: Self::Item) {}

    /// Render data for the container itself
    fn describe(&self, id: &str) -> DisplayRecord;

    /// Message shown when the collection is empty
    fn placeholder(&self) -> String;

    /// Show the only child's children in its place
    fn splat(&self) -> bool {
        false
    }

    /// Bind `on_change` to the collection's change stream
    ///
    /// `None` means the collection has no change stream.
    fn subscribe(&self, _on_change: ChangeCallback) -> Option<anyhow::Result<Subscription>> {
        None
    }
}

/// How a container currently presents its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Nested,
    Splatted,
}

/// Node whose children mirror a live external collection
pub struct ReconcilingContainerNode<S: ContainerSource> {
    me: Weak<Self>,
    base: NodeBase,
    source: S,
    /// Current children with their keys, in display order
    entries: Mutex<Vec<(String, Arc<S::Child>)>>,
    /// Whether the cached generation is the empty-collection placeholder
    placeholder: AtomicBool,
    layout: Mutex<Option<Layout>>,
    subscription: SubscriptionHandle,
}

impl<S: ContainerSource> ReconcilingContainerNode<S> {
    pub fn new(
        id: impl Into<String>,
        parent: Option<WeakNodeRef>,
        context: TreeContext,
        source: S,
    ) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: NodeBase::new(id, parent, context),
            source,
            entries: Mutex::new(Vec::new()),
            placeholder: AtomicBool::new(false),
            layout: Mutex::new(None),
            subscription: SubscriptionHandle::new(),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Materialized children, typed, in display order
    pub fn children(&self) -> Vec<Arc<S::Child>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, child)| child.clone())
            .collect()
    }

    /// Child currently materialized for `key`
    pub fn child(&self, key: &str) -> Option<Arc<S::Child>> {
        self.entries
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, child)| child.clone())
    }

    pub fn is_showing_placeholder(&self) -> bool {
        self.placeholder.load(Ordering::Acquire)
    }

    pub fn layout(&self) -> Option<Layout> {
        *self.layout.lock()
    }

    fn weak(&self) -> WeakNodeRef {
        self.me.clone()
    }

    /// React to a change reported by the source's change stream
    pub async fn on_source_changed(self: Arc<Self>) {
        match self.refresh(false).await {
            Ok(RefreshOutcome::Propagate) => {
                let node: NodeRef = self.clone();
                self.base.context().notify_node(node);
            }
            Ok(RefreshOutcome::Skip) => trace!("{}: change produced nothing to render", self.id()),
            Err(e) => warn!("{}: refresh after source change failed: {}", self.id(), e),
        }
    }

    async fn fetch_sorted(&self) -> Result<Vec<S::Item>> {
        let mut items = self
            .source
            .fetch()
            .await
            .map_err(|e| ViewError::compute(self.id(), e))?;
        items.sort_by_key(|item| self.source.order(item));
        Ok(items)
    }

    async fn load(&self) -> Result<Vec<NodeRef>> {
        let items = self.fetch_sorted().await?;

        let mut seen = AHashSet::with_capacity(items.len());
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let key = self.source.key(&item);
            if !seen.insert(key.clone()) {
                warn!("{}: ignoring duplicate key {}", self.id(), key);
                continue;
            }
            let child = self
                .source
                .create(item, self.id(), self.weak(), self.base.context());
            entries.push((key, child));
        }

        debug!("{}: loaded {} children", self.id(), entries.len());
        Ok(self.install(entries))
    }

    /// Record `entries` as the current generation and build the node list
    fn install(&self, entries: Vec<(String, Arc<S::Child>)>) -> Vec<NodeRef> {
        let children: Vec<NodeRef> = if entries.is_empty() {
            self.placeholder.store(true, Ordering::Release);
            let placeholder: NodeRef = MessageNode::new(
                self.id(),
                self.source.placeholder(),
                Some(self.weak()),
                self.base.context().clone(),
            );
            vec![placeholder]
        } else {
            self.placeholder.store(false, Ordering::Release);
            entries
                .iter()
                .map(|(_, child)| child.clone() as NodeRef)
                .collect()
        };

        *self.entries.lock() = entries;
        children
    }

    async fn reconcile(&self) -> Result<RefreshOutcome> {
        let guard = self.base.cache().transition().await;

        if self.base.cache().peek().is_none() {
            // Nothing materialized; the next get_children loads from scratch
            return Ok(RefreshOutcome::Propagate);
        }

        let items = self.fetch_sorted().await?;
        if self.base.is_disposed() {
            return Ok(RefreshOutcome::Skip);
        }

        let mut previous: AHashMap<String, Arc<S::Child>> =
            std::mem::take(&mut *self.entries.lock()).into_iter().collect();

        let mut seen = AHashSet::with_capacity(items.len());
        let mut entries = Vec::with_capacity(items.len());
        let mut kept = Vec::new();
        for item in items {
            let key = self.source.key(&item);
            if !seen.insert(key.clone()) {
                warn!("{}: ignoring duplicate key {}", self.id(), key);
                continue;
            }
            match previous.remove(&key) {
                Some(child) => {
                    self.source.update(&child, item);
                    kept.push(child.clone());
                    entries.push((key, child));
                }
                None => {
                    let child = self
                        .source
                        .create(item, self.id(), self.weak(), self.base.context());
                    entries.push((key, child));
                }
            }
        }

        let created = entries.len() - kept.len();
        let removed = previous.len();
        for (_, stale) in previous {
            self.base.context().set_hidden(stale.id(), false);
            stale.dispose();
        }

        if entries.is_empty() && self.is_showing_placeholder() {
            trace!("{}: still empty, keeping placeholder", self.id());
            return Ok(RefreshOutcome::Skip);
        }

        let children = self.install(entries);
        if let Some(old) = self.base.cache().replace(children.clone()) {
            // Only nodes that did not survive (the old placeholder) are left to drop
            for node in old {
                if !children.iter().any(|c| same_node(c, &node)) {
                    node.dispose();
                }
            }
        }
        drop(guard);

        debug!(
            "{}: reconciled (kept: {}, created: {}, removed: {})",
            self.id(),
            kept.len(),
            created,
            removed
        );

        let results = join_all(kept.iter().map(|child| child.refresh(false))).await;
        for (child, result) in kept.iter().zip(results) {
            if let Err(e) = result {
                warn!("{}: in-place refresh failed: {}", child.id(), e);
            }
        }

        Ok(RefreshOutcome::Propagate)
    }

    /// Track the nested/splatted presentation
    ///
    /// On a transition the affected children lose their remembered paging
    /// limits and are reset.
    async fn set_layout(&self, layout: Layout) {
        let previous = self.layout.lock().replace(layout);
        let entries = self.children();

        for child in &entries {
            self.base
                .context()
                .set_hidden(child.id(), layout == Layout::Splatted);
        }

        match previous {
            Some(previous) if previous != layout => {
                debug!(
                    "{}: layout {:?} -> {:?}, dropping paging state",
                    self.id(),
                    previous,
                    layout
                );
                for child in entries {
                    self.base.context().forget_limits_under(child.id());
                    if let Err(e) = child.refresh(true).await {
                        warn!("{}: reset after layout change failed: {}", child.id(), e);
                    }
                }
            }
            _ => {}
        }
    }

    fn release_entries(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        for (_, child) in entries {
            self.base.context().set_hidden(child.id(), false);
        }
    }
}

#[async_trait]
impl<S: ContainerSource> ViewNode for ReconcilingContainerNode<S> {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> Result<Vec<NodeRef>> {
        self.ensure_subscribed();

        let children = self.base.cache().get_or_load(|| self.load()).await?;
        if !self.source.splat() {
            return Ok(children);
        }

        let single = {
            let entries = self.entries.lock();
            (entries.len() == 1).then(|| entries[0].1.clone())
        };
        match single {
            Some(only) => {
                self.set_layout(Layout::Splatted).await;
                only.get_children().await
            }
            None => {
                self.set_layout(Layout::Nested).await;
                Ok(children)
            }
        }
    }

    async fn display_record(&self) -> Result<DisplayRecord> {
        Ok(self.source.describe(self.id()))
    }

    async fn refresh(&self, reset: bool) -> Result<RefreshOutcome> {
        if self.base.is_disposed() {
            return Ok(RefreshOutcome::Skip);
        }

        if reset {
            let _guard = self.base.cache().transition().await;
            self.release_entries();
            self.placeholder.store(false, Ordering::Release);
            self.base.reset_children();
            return Ok(RefreshOutcome::Propagate);
        }

        self.reconcile().await
    }

    fn dispose(&self) {
        if self.base.dispose() {
            self.subscription.dispose();
            self.release_entries();
        }
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }

    fn as_subscribeable(&self) -> Option<&dyn Subscribeable> {
        Some(self)
    }
}

impl<S: ContainerSource> Subscribeable for ReconcilingContainerNode<S> {
    fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    fn subscribe(&self) -> Result<Subscription> {
        let weak = self.me.clone();
        let on_change: ChangeCallback = Arc::new(move || {
            if let Some(container) = weak.upgrade() {
                tokio::spawn(container.on_source_changed());
            }
        });

        match self.source.subscribe(on_change) {
            None => Ok(Subscription::noop()),
            Some(Ok(subscription)) => {
                debug!("{}: subscribed to collection changes", self.id());
                Ok(subscription)
            }
            Some(Err(e)) => Err(ViewError::subscription(self.id(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TreeChange;
    use crate::node::{Collapsible, RefreshOutcome};
    use crate::testing::{probe, Probe, TestNode, TestSpec};
    use crate::tree::ViewTree;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Collection of `(key, index)` pairs, children are test nodes
    ///
    /// Clones share state so tests can mutate the collection after handing
    /// the source to a container.
    #[derive(Clone)]
    struct ListSource {
        items: Arc<Mutex<Vec<(String, usize)>>>,
        probe: Arc<Probe>,
        splat: bool,
        fail: Arc<AtomicBool>,
        fetches: Arc<AtomicUsize>,
        on_change: Arc<Mutex<Option<ChangeCallback>>>,
        /// Park the next fetch until `release` is notified
        hold: Arc<AtomicBool>,
        parked: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl ListSource {
        fn new(items: &[(&str, usize)], probe: &Arc<Probe>) -> Self {
            let source = Self {
                items: Arc::new(Mutex::new(Vec::new())),
                probe: probe.clone(),
                splat: false,
                fail: Arc::new(AtomicBool::new(false)),
                fetches: Arc::new(AtomicUsize::new(0)),
                on_change: Arc::new(Mutex::new(None)),
                hold: Arc::new(AtomicBool::new(false)),
                parked: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            };
            source.set(items);
            source
        }

        fn splatting(mut self) -> Self {
            self.splat = true;
            self
        }

        fn set(&self, items: &[(&str, usize)]) {
            *self.items.lock() = items.iter().map(|(k, i)| (k.to_string(), *i)).collect();
        }

        fn emit(&self) {
            let callback = self.on_change.lock().clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    #[async_trait]
    impl ContainerSource for ListSource {
        type Item = (String, usize);
        type Child = TestNode;

        async fn fetch(&self) -> anyhow::Result<Vec<Self::Item>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.hold.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("source offline");
            }
            Ok(self.items.lock().clone())
        }

        fn order(&self, item: &Self::Item) -> usize {
            item.1
        }

        fn key(&self, item: &Self::Item) -> String {
            item.0.trim_end_matches('/').to_string()
        }

        fn create(
            &self,
            item: Self::Item,
            parent_id: &str,
            parent: WeakNodeRef,
            context: &TreeContext,
        ) -> Arc<TestNode> {
            let key = self.key(&item);
            let spec = TestSpec::new(&key).children(["x", "y"]).subscribed();
            TestNode::create(spec, format!("{}/{}", parent_id, key), Some(parent), context, &self.probe)
        }

        fn describe(&self, id: &str) -> DisplayRecord {
            DisplayRecord::new(id, "Items", Collapsible::Expanded)
        }

        fn placeholder(&self) -> String {
            "No items".to_string()
        }

        fn splat(&self) -> bool {
            self.splat
        }

        fn subscribe(&self, on_change: ChangeCallback) -> Option<anyhow::Result<Subscription>> {
            *self.on_change.lock() = Some(on_change);
            Some(Ok(Subscription::noop()))
        }
    }

    fn ids(nodes: &[NodeRef]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    fn tree_over(id: &'static str, source: &ListSource) -> ViewTree {
        let source = source.clone();
        ViewTree::new(
            move |context: &TreeContext| -> NodeRef {
                ReconcilingContainerNode::new(id, None, context.clone(), source.clone())
            },
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_reconciliation_preserves_identity() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0), ("b", 1), ("c", 2)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source.clone());

        let before = container.get_children().await.unwrap();
        for child in &before {
            child.get_children().await.unwrap();
        }
        assert_eq!(ids(&before), vec!["root/a", "root/b", "root/c"]);

        source.set(&[("b", 0), ("c", 1), ("d", 2)]);
        assert_eq!(container.refresh(false).await.unwrap(), RefreshOutcome::Propagate);

        let after = container.get_children().await.unwrap();
        assert_eq!(ids(&after), vec!["root/b", "root/c", "root/d"]);
        assert!(same_node(&after[0], &before[1]));
        assert!(same_node(&after[1], &before[2]));

        // Kept children keep their subscription
        assert!(!after[0].is_disposed());
        assert_eq!(probe.subscribed("root/b"), 1);
        assert_eq!(probe.released("root/b"), 0);

        // Dropped child is disposed exactly once
        assert!(before[0].is_disposed());
        assert_eq!(probe.released("root/a"), 1);
        before[0].dispose();
        assert_eq!(probe.released("root/a"), 1);

        // New child is unloaded until asked
        assert_eq!(after[2].state(), NodeState::Unloaded);
    }

    #[tokio::test]
    async fn test_children_follow_index_order() {
        let (probe, _) = probe();
        let source = ListSource::new(&[("/r2", 1), ("/r1", 0)], &probe);
        let tree = tree_over("repositories", &source);

        let before = tree.get_children(None).await;
        assert_eq!(ids(&before), vec!["repositories//r1", "repositories//r2"]);

        source.set(&[("/r2", 0), ("/r3", 1)]);
        let root = tree.root();
        assert!(tree.refresh_node(&root, false).await);

        let after = tree.get_children(None).await;
        assert_eq!(ids(&after), vec!["repositories//r2", "repositories//r3"]);
        assert!(same_node(&after[0], &before[1]));
        assert!(before[0].is_disposed());
    }

    #[tokio::test]
    async fn test_source_change_reconciles_and_notifies() {
        let (probe, _) = probe();
        let source = ListSource::new(&[("/r1", 0), ("/r2", 1)], &probe);
        let tree = tree_over("repositories", &source);
        let mut changes = tree.changes();

        let before = tree.get_children(None).await;

        source.set(&[("/r2", 0), ("/r3", 1)]);
        source.emit();

        let change = changes.recv().await.unwrap();
        assert!(matches!(change, TreeChange::All));

        let after = tree.get_children(None).await;
        assert_eq!(ids(&after), vec!["repositories//r2", "repositories//r3"]);
        assert!(same_node(&after[0], &before[1]));
        assert!(before[0].is_disposed());
    }

    #[tokio::test]
    async fn test_empty_collection_does_not_flicker() {
        let (probe, _) = probe();
        let source = ListSource::new(&[], &probe);
        let tree = tree_over("root", &source);
        let mut changes = tree.changes();

        let children = tree.get_children(None).await;
        assert_eq!(ids(&children), vec!["root/message"]);
        let record = tree.get_display_record(&children[0]).await;
        assert_eq!(record.label, "No items");

        let root = tree.root();
        assert!(!tree.refresh_node(&root, false).await);
        assert!(!tree.refresh_node(&root, false).await);
        assert!(changes.try_recv().is_err());

        // Placeholder instance is untouched
        let again = tree.get_children(None).await;
        assert!(same_node(&children[0], &again[0]));
    }

    #[tokio::test]
    async fn test_emptying_emits_once() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source.clone());

        let before = container.get_children().await.unwrap();
        source.set(&[]);

        assert_eq!(container.refresh(false).await.unwrap(), RefreshOutcome::Propagate);
        assert_eq!(container.refresh(false).await.unwrap(), RefreshOutcome::Skip);
        assert!(container.is_showing_placeholder());
        assert!(before[0].is_disposed());

        source.set(&[("b", 0)]);
        assert_eq!(container.refresh(false).await.unwrap(), RefreshOutcome::Propagate);
        let after = container.get_children().await.unwrap();
        assert_eq!(ids(&after), vec!["root/b"]);
        assert!(!container.is_showing_placeholder());
    }

    #[tokio::test]
    async fn test_refresh_before_load_does_not_fetch() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source.clone());

        assert_eq!(container.refresh(false).await.unwrap(), RefreshOutcome::Propagate);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_recreates_children() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source);

        let before = container.get_children().await.unwrap();
        container.refresh(true).await.unwrap();
        assert_eq!(container.state(), NodeState::Stale);

        let after = container.get_children().await.unwrap();
        assert!(before[0].is_disposed());
        assert!(!same_node(&before[0], &after[0]));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_generation() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source.clone());
        let before = container.get_children().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(container.refresh(false).await.is_err());

        let after = container.get_children().await.unwrap();
        assert!(same_node(&before[0], &after[0]));
    }

    #[tokio::test]
    async fn test_splat_transition_drops_paging_state() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0)], &probe).splatting();
        let container = ReconcilingContainerNode::new("root", None, context.clone(), source.clone());

        let splatted = container.get_children().await.unwrap();
        assert_eq!(ids(&splatted), vec!["root/a/x", "root/a/y"]);
        assert_eq!(container.layout(), Some(Layout::Splatted));
        assert!(context.is_hidden("root/a"));

        context.remember_limit("root/a", Some(60));
        source.set(&[("a", 0), ("b", 1)]);
        container.refresh(false).await.unwrap();

        let nested = container.get_children().await.unwrap();
        assert_eq!(ids(&nested), vec!["root/a", "root/b"]);
        assert_eq!(container.layout(), Some(Layout::Nested));
        assert!(!context.is_hidden("root/a"));
        assert_eq!(context.last_known_limit("root/a"), None);
    }

    #[tokio::test]
    async fn test_dispose_during_reconcile_releases_once() {
        let (probe, context) = probe();
        let source = ListSource::new(&[("a", 0), ("b", 1)], &probe);
        let container = ReconcilingContainerNode::new("root", None, context, source.clone());
        let children = container.get_children().await.unwrap();
        for child in &children {
            child.get_children().await.unwrap();
        }

        // Reconciliation drops `a`; the container is torn down mid-fetch
        source.set(&[("b", 0)]);
        source.hold.store(true, Ordering::SeqCst);
        let refresh = tokio::spawn({
            let container = container.clone();
            async move { container.refresh(false).await }
        });
        source.parked.notified().await;

        container.dispose();
        source.release.notify_one();

        let outcome = refresh.await.unwrap().unwrap();
        assert!(matches!(outcome, RefreshOutcome::Skip));
        container.dispose();

        assert_eq!(probe.released("root/a"), 1);
        assert_eq!(probe.released("root/b"), 1);
        assert!(container.children().is_empty());
    }
}

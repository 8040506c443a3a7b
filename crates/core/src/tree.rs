//! The view tree orchestrator
//!
//! `ViewTree` is the boundary the host UI talks to. It:
//! - owns the root node (created lazily through a `RootFactory`)
//! - forwards host queries (children, display records, parents)
//! - turns node refreshes into change notifications
//! - drives paging and remembers the window sizes the user chose
//! - forwards reveal requests to the attached `HostView`
//!
//! Bounded search lives in `search.rs`.

use crate::context::{TreeChange, TreeContext, TreeOptions};
use crate::error::{Result, ViewError};
use crate::node::{DisplayRecord, NodeRef, RefreshOutcome};
use crate::paging::PageRequest;
use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Builds the root node of a tree
pub trait RootFactory: Send + Sync + 'static {
    fn create(&self, context: &TreeContext) -> NodeRef;
}

impl<F> RootFactory for F
where
    F: Fn(&TreeContext) -> NodeRef + Send + Sync + 'static,
{
    fn create(&self, context: &TreeContext) -> NodeRef {
        self(context)
    }
}

/// How far a reveal should expand the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expand {
    #[default]
    None,
    /// Expand the node itself
    Node,
    /// Expand this many levels below the node
    Levels(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RevealOptions {
    pub select: bool,
    pub focus: bool,
    pub expand: Expand,
}

impl RevealOptions {
    /// Select without moving focus
    pub fn select() -> Self {
        Self {
            select: true,
            ..Self::default()
        }
    }

    /// Select, focus and expand the node
    pub fn focus_and_expand() -> Self {
        Self {
            select: true,
            focus: true,
            expand: Expand::Node,
        }
    }
}

/// The host UI side of `reveal`
#[async_trait]
pub trait HostView: Send + Sync {
    /// Scroll to, select and/or expand `node`
    async fn reveal(&self, node: NodeRef, options: RevealOptions) -> anyhow::Result<()>;
}

pub struct ViewTree {
    context: TreeContext,
    factory: Box<dyn RootFactory>,
    root: Mutex<Option<NodeRef>>,
    host: RwLock<Option<Arc<dyn HostView>>>,
    visible: AtomicBool,
    /// Ids of nodes the host reports as expanded
    expanded: DashSet<String>,
}

impl ViewTree {
    pub fn new(factory: impl RootFactory, options: TreeOptions) -> Self {
        Self {
            context: TreeContext::new(options),
            factory: Box::new(factory),
            root: Mutex::new(None),
            host: RwLock::new(None),
            visible: AtomicBool::new(false),
            expanded: DashSet::new(),
        }
    }

    pub fn context(&self) -> &TreeContext {
        &self.context
    }

    /// Attach (or replace) the host view used by `reveal`
    pub fn attach_host(&self, host: Arc<dyn HostView>) {
        *self.host.write() = Some(host);
    }

    /// Subscribe to change notifications for the host UI
    pub fn changes(&self) -> broadcast::Receiver<TreeChange> {
        self.context.subscribe_changes()
    }

    /// The root, created on first use
    pub fn root(&self) -> NodeRef {
        let mut slot = self.root.lock();
        if let Some(root) = slot.as_ref() {
            return root.clone();
        }

        let root = self.factory.create(&self.context);
        debug!("Created root {}", root.id());
        self.context.set_root(Some(&root));
        *slot = Some(root.clone());
        root
    }

    /// Children of `node`, or of the root when `node` is `None`
    ///
    /// Computation failures are logged and render as no children.
    pub async fn get_children(&self, node: Option<&NodeRef>) -> Vec<NodeRef> {
        let node = match node {
            Some(node) => node.clone(),
            None => self.root(),
        };

        match node.get_children().await {
            Ok(children) => children,
            Err(e) => {
                warn!("Failed to load children of {}: {}", node.id(), e);
                Vec::new()
            }
        }
    }

    /// Render data for `node`; failures fall back to a minimal record
    pub async fn get_display_record(&self, node: &NodeRef) -> DisplayRecord {
        match node.display_record().await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to describe {}: {}", node.id(), e);
                DisplayRecord::minimal(node.id())
            }
        }
    }

    /// Parent as the host sees it
    ///
    /// Hidden (splatted) ancestors are skipped and top-level nodes have no
    /// parent, since the root itself is never rendered.
    pub fn get_parent(&self, node: &NodeRef) -> Option<NodeRef> {
        let mut current = node.parent()?;
        loop {
            if self.context.is_root(&current) {
                return None;
            }
            if !self.context.is_hidden(current.id()) {
                return Some(current);
            }
            current = current.parent()?;
        }
    }

    /// Refresh the root and re-render everything
    pub async fn refresh(&self, reset: bool) -> Result<()> {
        let root = self.root();
        let result = root.refresh(reset).await;
        self.context.notify(TreeChange::All);
        result.map(|_| ())
    }

    /// Refresh `node`; returns true when a change was emitted
    pub async fn refresh_node(&self, node: &NodeRef, reset: bool) -> bool {
        match node.refresh(reset).await {
            Ok(RefreshOutcome::Skip) => {
                trace!("{}: refresh skipped", node.id());
                false
            }
            Ok(RefreshOutcome::Propagate) => {
                self.context.notify_node(node.clone());
                true
            }
            Err(e) => {
                warn!("Failed to refresh {}: {}", node.id(), e);
                false
            }
        }
    }

    /// Ask the host to reveal `node`; returns false when it could not
    ///
    /// Host-side failures are logged and swallowed.
    pub async fn reveal(&self, node: &NodeRef, options: RevealOptions) -> bool {
        let host = self.host.read().clone();
        let Some(host) = host else {
            trace!("No host attached, not revealing {}", node.id());
            return false;
        };

        match host.reveal(node.clone(), options).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", ViewError::reveal(node.id(), e));
                false
            }
        }
    }

    /// Extend the window of a pageable `node`
    ///
    /// `previous` (typically the "load more" leaf that was clicked) is
    /// selected first so the host keeps its scroll position. The resulting
    /// limit is remembered so a later full refresh restores it.
    pub async fn show_more(
        &self,
        node: &NodeRef,
        request: PageRequest,
        previous: Option<&NodeRef>,
    ) -> bool {
        let Some(pageable) = node.as_pageable() else {
            warn!(
                "{}",
                ViewError::Unsupported {
                    id: node.id().to_string(),
                    capability: "pageable",
                }
            );
            return false;
        };

        if let Some(previous) = previous {
            self.reveal(previous, RevealOptions::select()).await;
        }

        if let Err(e) = pageable.show_more(request).await {
            warn!("Failed to page {}: {}", node.id(), e);
            return false;
        }

        let limit = pageable.limit();
        debug!("{}: window is now {:?}", node.id(), limit);
        self.context.remember_limit(node.id(), limit);
        self.context.notify_node(node.clone());
        true
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Host visibility changed; the root only listens while visible
    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::AcqRel) == visible {
            return;
        }

        let root = self.root();
        if let Some(subscribeable) = root.as_subscribeable() {
            if visible {
                subscribeable.ensure_subscribed();
            } else {
                subscribeable.unsubscribe();
            }
        }
    }

    /// Host expanded `node`
    pub fn on_expanded(&self, node: &NodeRef) {
        if let Some(subscribeable) = node.as_subscribeable() {
            subscribeable.ensure_subscribed();
        }
        self.expanded.insert(node.id().to_string());
    }

    /// Host collapsed `node`
    pub fn on_collapsed(&self, node: &NodeRef) {
        self.expanded.remove(node.id());
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Dispose the root; the next access rebuilds it
    pub fn reset_root(&self) {
        let previous = self.root.lock().take();
        self.context.set_root(None);
        if let Some(root) = previous {
            debug!("Reset root {}", root.id());
            root.dispose();
        }
        self.context.notify(TreeChange::All);
    }

    /// Tear the tree down without notifying
    pub fn dispose(&self) {
        let previous = self.root.lock().take();
        self.context.set_root(None);
        if let Some(root) = previous {
            root.dispose();
        }
    }
}

impl Drop for ViewTree {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{probe, TestNode, TestSpec};
    use parking_lot::Mutex as SyncMutex;

    fn tree_of(spec: TestSpec) -> (ViewTree, Arc<crate::testing::Probe>) {
        let (probe, _) = probe();
        let factory_probe = probe.clone();
        let tree = ViewTree::new(
            move |context: &TreeContext| -> NodeRef {
                TestNode::root(spec.clone(), context, &factory_probe)
            },
            TreeOptions::default(),
        );
        (tree, probe)
    }

    #[derive(Default)]
    struct RecordingHost {
        revealed: SyncMutex<Vec<(String, RevealOptions)>>,
        fail: bool,
    }

    #[async_trait]
    impl HostView for RecordingHost {
        async fn reveal(&self, node: NodeRef, options: RevealOptions) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("view is not attached");
            }
            self.revealed.lock().push((node.id().to_string(), options));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_root_is_created_once() {
        let (tree, probe) = tree_of(TestSpec::new("root").children(["a"]));

        let first = tree.root();
        let second = tree.root();
        assert!(Arc::ptr_eq(&first, &second));

        tree.get_children(None).await;
        tree.get_children(None).await;
        assert_eq!(probe.loads("root"), 1);
    }

    #[tokio::test]
    async fn test_refresh_emits_whole_tree_change() {
        let (tree, _) = tree_of(TestSpec::new("root").children(["a"]));
        let mut changes = tree.changes();

        tree.refresh(false).await.unwrap();

        assert!(matches!(changes.recv().await.unwrap(), TreeChange::All));
    }

    #[tokio::test]
    async fn test_refresh_node_skip_emits_nothing() {
        let spec = TestSpec::new("root")
            .child(TestSpec::new("a").skip_refresh())
            .child(TestSpec::new("b"));
        let (tree, _) = tree_of(spec);
        let mut changes = tree.changes();
        let children = tree.get_children(None).await;

        assert!(!tree.refresh_node(&children[0], false).await);
        assert!(changes.try_recv().is_err());

        assert!(tree.refresh_node(&children[1], false).await);
        let change = changes.recv().await.unwrap();
        assert_eq!(change.node_id(), Some("root/b"));
    }

    #[tokio::test]
    async fn test_root_refresh_node_widens_to_all() {
        let (tree, _) = tree_of(TestSpec::new("root"));
        let mut changes = tree.changes();

        let root = tree.root();
        assert!(tree.refresh_node(&root, false).await);
        assert!(matches!(changes.recv().await.unwrap(), TreeChange::All));
    }

    #[tokio::test]
    async fn test_reveal_failure_is_swallowed() {
        let (tree, _) = tree_of(TestSpec::new("root").children(["a"]));
        let children = tree.get_children(None).await;

        assert!(!tree.reveal(&children[0], RevealOptions::select()).await);

        tree.attach_host(Arc::new(RecordingHost {
            fail: true,
            ..Default::default()
        }));
        assert!(!tree.reveal(&children[0], RevealOptions::select()).await);

        let host = Arc::new(RecordingHost::default());
        tree.attach_host(host.clone());
        assert!(tree.reveal(&children[0], RevealOptions::focus_and_expand()).await);
        assert_eq!(host.revealed.lock()[0].0, "root/a");
    }

    #[tokio::test]
    async fn test_show_more_remembers_limit() {
        let spec = TestSpec::new("root").child(
            TestSpec::new("branch")
                .children(["c1", "c2", "c3", "c4", "c5"])
                .paged(2),
        );
        let (tree, probe) = tree_of(spec);
        let host = Arc::new(RecordingHost::default());
        tree.attach_host(host.clone());
        let mut changes = tree.changes();

        let branch = tree.get_children(None).await.remove(0);
        let window = tree.get_children(Some(&branch)).await;
        assert_eq!(window.len(), 2);

        assert!(tree.show_more(&branch, PageRequest::Count(2), Some(&window[1])).await);

        assert_eq!(probe.show_more_calls("root/branch"), 1);
        assert_eq!(tree.context().last_known_limit("root/branch"), Some(Some(4)));
        assert_eq!(tree.get_children(Some(&branch)).await.len(), 4);
        assert_eq!(host.revealed.lock()[0].0, "root/branch/c2");
        assert_eq!(changes.recv().await.unwrap().node_id(), Some("root/branch"));

        // A rebuilt tree restores the remembered window
        tree.reset_root();
        let branch = tree.get_children(None).await.remove(0);
        assert_eq!(tree.get_children(Some(&branch)).await.len(), 4);
    }

    #[tokio::test]
    async fn test_show_more_on_plain_node_is_refused() {
        let (tree, _) = tree_of(TestSpec::new("root").children(["a"]));
        let a = tree.get_children(None).await.remove(0);

        assert!(!tree.show_more(&a, PageRequest::All, None).await);
        assert_eq!(tree.context().last_known_limit("root/a"), None);
    }

    #[tokio::test]
    async fn test_failures_degrade_gracefully() {
        let spec = TestSpec::new("root").child(TestSpec::new("broken").children(["x"]).failing());
        let (tree, _) = tree_of(spec);

        let broken = tree.get_children(None).await.remove(0);
        assert!(tree.get_children(Some(&broken)).await.is_empty());

        let record = tree.get_display_record(&broken).await;
        assert_eq!(record, DisplayRecord::minimal("root/broken"));
    }

    #[tokio::test]
    async fn test_get_parent_hides_root() {
        let spec = TestSpec::new("root").child(TestSpec::new("a").children(["x"]));
        let (tree, _) = tree_of(spec);

        let a = tree.get_children(None).await.remove(0);
        let x = tree.get_children(Some(&a)).await.remove(0);

        assert!(tree.get_parent(&a).is_none());
        assert_eq!(tree.get_parent(&x).unwrap().id(), "root/a");

        tree.context().set_hidden("root/a", true);
        assert!(tree.get_parent(&x).is_none());
    }

    #[tokio::test]
    async fn test_visibility_and_expansion_drive_subscriptions() {
        let spec = TestSpec::new("root")
            .subscribed()
            .child(TestSpec::new("a").subscribed());
        let (tree, probe) = tree_of(spec);

        tree.set_visible(true);
        tree.set_visible(true);
        assert_eq!(probe.subscribed("root"), 1);

        tree.set_visible(false);
        assert_eq!(probe.released("root"), 1);

        let a = tree.get_children(None).await.remove(0);
        tree.on_expanded(&a);
        assert!(tree.is_expanded("root/a"));
        assert_eq!(probe.subscribed("root/a"), 1);

        tree.on_collapsed(&a);
        assert!(!tree.is_expanded("root/a"));
    }

    #[tokio::test]
    async fn test_drop_disposes_root() {
        let (tree, probe) = tree_of(TestSpec::new("root").subscribed().children(["a"]));
        let root = tree.root();
        tree.get_children(None).await;

        drop(tree);

        assert!(root.is_disposed());
        assert_eq!(probe.released("root"), 1);
    }
}

//! View node contract and the state every node shares
//!
//! A node is identified by a path-like `id` that is stable across refreshes.
//! Ownership flows strictly downwards: a parent owns its cached children
//! (`ChildCache`), children hold only a weak back-reference to their parent.
//!
//! Node lifecycle:
//! `Unloaded -> Loaded -> Stale -> Loaded -> ... -> Disposed`

use crate::context::TreeContext;
use crate::error::Result;
use crate::paging::Pageable;
use crate::subscription::Subscribeable;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Shared handle to a node
pub type NodeRef = Arc<dyn ViewNode>;

/// Non-owning handle to a node (parent back-references)
pub type WeakNodeRef = Weak<dyn ViewNode>;

/// Identity comparison (same instance, not same id)
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Escape one segment of a node id
///
/// `/` separates segments, so it is percent-encoded inside one (along with
/// `%` itself). Branch `feature` then never prefixes branch `feature/x`.
pub fn id_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['/', '%']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// How the host should render a node's expander
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collapsible {
    /// Leaf
    None,
    Collapsed,
    Expanded,
}

/// Opaque command attached to a display record
///
/// The engine only forwards it; the host decides what it means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<serde_json::Value>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.push(value.into());
        self
    }
}

/// Everything the host needs to render one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRecord {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub collapsible: Collapsible,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandDescriptor>,
    /// Host-side discriminator (menus, when-clauses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_value: Option<String>,
}

impl DisplayRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>, collapsible: Collapsible) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            tooltip: None,
            icon: None,
            collapsible,
            command: None,
            context_value: None,
        }
    }

    /// Fallback record used when a node fails to describe itself
    pub fn minimal(id: &str) -> Self {
        Self::new(id, id, Collapsible::None)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn command(mut self, command: CommandDescriptor) -> Self {
        self.command = Some(command);
        self
    }

    pub fn context_value(mut self, value: impl Into<String>) -> Self {
        self.context_value = Some(value.into());
        self
    }
}

/// Answer of `ViewNode::refresh`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Something may have changed; notify the host
    Propagate,
    /// Nothing to re-render (already up to date, load in progress, ...)
    Skip,
}

/// Cache state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Children never requested
    Unloaded,
    /// Children cached
    Loaded,
    /// Cache dropped by a reset; next `get_children` recomputes
    Stale,
    /// Terminal
    Disposed,
}

/// Contract every node in the view tree fulfills
#[async_trait]
pub trait ViewNode: Send + Sync {
    /// Stable, path-like identity
    fn id(&self) -> &str;

    /// Parent node, `None` for the root (or an orphaned node)
    fn parent(&self) -> Option<NodeRef>;

    /// Cached children, computing and caching them on first use
    async fn get_children(&self) -> Result<Vec<NodeRef>>;

    /// Render data for this node
    async fn display_record(&self) -> Result<DisplayRecord>;

    /// Refresh node state; nodes without state keep the default
    async fn refresh(&self, _reset: bool) -> Result<RefreshOutcome> {
        Ok(RefreshOutcome::Propagate)
    }

    /// Release the subscription and dispose materialized children
    ///
    /// Must be idempotent.
    fn dispose(&self);

    fn state(&self) -> NodeState;

    fn is_disposed(&self) -> bool {
        self.state() == NodeState::Disposed
    }

    /// Paging capability
    fn as_pageable(&self) -> Option<&dyn Pageable> {
        None
    }

    /// Live-update capability
    fn as_subscribeable(&self) -> Option<&dyn Subscribeable> {
        None
    }
}

impl fmt::Debug for dyn ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewNode")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Dispose every node in `nodes`
pub fn dispose_all(nodes: impl IntoIterator<Item = NodeRef>) {
    for node in nodes {
        node.dispose();
    }
}

/// Cached children generation of one node
///
/// Reads are lock-free apart from a short `parking_lot` critical section;
/// loads are serialized through an async gate so that concurrent callers on
/// the same node share a single computation.
pub struct ChildCache {
    inner: Mutex<CacheInner>,
    gate: tokio::sync::Mutex<()>,
}

struct CacheInner {
    state: NodeState,
    children: Option<Vec<NodeRef>>,
}

impl ChildCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                state: NodeState::Unloaded,
                children: None,
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> NodeState {
        self.inner.lock().state
    }

    /// Current generation without loading
    pub fn peek(&self) -> Option<Vec<NodeRef>> {
        self.inner.lock().children.clone()
    }

    /// Serialize a cache transition with other loads of this node
    pub async fn transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Return the cached generation, loading it with `load` if absent
    ///
    /// A disposed cache yields no children; anything loaded while the node
    /// was being disposed is disposed immediately.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Vec<NodeRef>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<NodeRef>>>,
    {
        if let Some(children) = self.peek() {
            return Ok(children);
        }

        let _guard = self.gate.lock().await;

        // Another caller may have finished loading while we waited
        if let Some(children) = self.peek() {
            return Ok(children);
        }
        if self.state() == NodeState::Disposed {
            return Ok(Vec::new());
        }

        let children = load().await?;

        let mut inner = self.inner.lock();
        if inner.state == NodeState::Disposed {
            drop(inner);
            dispose_all(children);
            return Ok(Vec::new());
        }

        inner.children = Some(children.clone());
        inner.state = NodeState::Loaded;
        Ok(children)
    }

    /// Store a new generation, returning the previous one
    ///
    /// Callers decide which previous children to dispose (reconciliation
    /// keeps some of them).
    pub fn replace(&self, children: Vec<NodeRef>) -> Option<Vec<NodeRef>> {
        let mut inner = self.inner.lock();
        if inner.state == NodeState::Disposed {
            drop(inner);
            dispose_all(children);
            return None;
        }

        inner.state = NodeState::Loaded;
        inner.children.replace(children)
    }

    /// Drop the cached generation (`Loaded -> Stale`) and return it
    pub fn invalidate(&self) -> Option<Vec<NodeRef>> {
        let mut inner = self.inner.lock();
        if inner.state == NodeState::Loaded {
            inner.state = NodeState::Stale;
        }
        inner.children.take()
    }

    /// Enter the terminal state, returning the materialized children
    pub fn close(&self) -> Option<Vec<NodeRef>> {
        let mut inner = self.inner.lock();
        inner.state = NodeState::Disposed;
        inner.children.take()
    }
}

impl Default for ChildCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity, ownership and cache state shared by all node kinds
pub struct NodeBase {
    id: String,
    parent: Option<WeakNodeRef>,
    context: TreeContext,
    cache: ChildCache,
    disposed: AtomicBool,
}

impl NodeBase {
    pub fn new(id: impl Into<String>, parent: Option<WeakNodeRef>, context: TreeContext) -> Self {
        Self {
            id: id.into(),
            parent,
            context,
            cache: ChildCache::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.as_ref().and_then(|weak| weak.upgrade())
    }

    pub fn context(&self) -> &TreeContext {
        &self.context
    }

    pub fn cache(&self) -> &ChildCache {
        &self.cache
    }

    pub fn state(&self) -> NodeState {
        if self.is_disposed() {
            NodeState::Disposed
        } else {
            self.cache.state()
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drop the cached generation and dispose it (`refresh(reset = true)`)
    pub fn reset_children(&self) {
        if let Some(children) = self.cache.invalidate() {
            trace!("{}: reset {} children", self.id, children.len());
            dispose_all(children);
        }
    }

    /// Mark the node disposed and dispose its materialized children
    ///
    /// Returns true only for the first caller, so owners can release
    /// their own resources exactly once.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        trace!("{}: disposed", self.id);
        if let Some(children) = self.cache.close() {
            dispose_all(children);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{probe, TestNode, TestSpec};

    #[test]
    fn test_id_segment_escapes_separators() {
        assert!(matches!(id_segment("main"), Cow::Borrowed("main")));
        assert_eq!(id_segment("feature/x"), "feature%2Fx");
        assert_eq!(id_segment("/work/app"), "%2Fwork%2Fapp");
        assert_eq!(id_segment("100%"), "100%25");
    }

    #[tokio::test]
    async fn test_children_are_cached() {
        let (probe, context) = probe();
        let node = TestNode::root(TestSpec::new("root").children(["a", "b"]), &context, &probe);

        let first = node.get_children().await.unwrap();
        let second = node.get_children().await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(first.iter().zip(&second).all(|(a, b)| same_node(a, b)));
        assert_eq!(probe.loads("root"), 1);
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (probe, context) = probe();
        let node = TestNode::root(TestSpec::new("root").children(["a"]), &context, &probe);
        assert_eq!(node.state(), NodeState::Unloaded);

        let first = node.get_children().await.unwrap();
        assert_eq!(node.state(), NodeState::Loaded);

        node.refresh(true).await.unwrap();
        assert_eq!(node.state(), NodeState::Stale);
        assert!(first[0].is_disposed());

        let second = node.get_children().await.unwrap();
        assert_eq!(node.state(), NodeState::Loaded);
        assert!(!same_node(&first[0], &second[0]));
        assert_eq!(probe.loads("root"), 2);

        node.dispose();
        assert_eq!(node.state(), NodeState::Disposed);
        assert!(second[0].is_disposed());
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_computation() {
        let (probe, context) = probe();
        let node = TestNode::root(TestSpec::new("root").children(["a", "b", "c"]), &context, &probe);

        let (left, right) = tokio::join!(node.get_children(), node.get_children());

        let (left, right) = (left.unwrap(), right.unwrap());
        assert!(left.iter().zip(&right).all(|(a, b)| same_node(a, b)));
        assert_eq!(probe.loads("root"), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_transitive() {
        let (probe, context) = probe();
        let node = TestNode::root(
            TestSpec::new("root").child(TestSpec::new("a").children(["a1"]).subscribed()),
            &context,
            &probe,
        );

        let children = node.get_children().await.unwrap();
        let grandchildren = children[0].get_children().await.unwrap();
        assert_eq!(probe.subscribed("root/a"), 1);

        node.dispose();
        node.dispose();
        children[0].dispose();

        assert!(grandchildren[0].is_disposed());
        assert_eq!(probe.released("root/a"), 1);
    }

    #[tokio::test]
    async fn test_disposed_node_yields_no_children() {
        let (probe, context) = probe();
        let node = TestNode::root(TestSpec::new("root").children(["a"]), &context, &probe);

        node.dispose();

        assert!(node.get_children().await.unwrap().is_empty());
        assert_eq!(probe.loads("root"), 0);
    }

    #[test]
    fn test_command_descriptor_serializes_arguments() {
        let record = DisplayRecord::new("c", "Commit", Collapsible::Collapsed)
            .command(CommandDescriptor::new("vista.showCommit").arg("/r1").arg("abc123"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["command"]["name"], "vista.showCommit");
        assert_eq!(json["command"]["arguments"][1], "abc123");
        assert_eq!(json["collapsible"], "collapsed");
        assert!(json.get("description").is_none());
    }
}

//! Shared per-tree state handed to every node
//!
//! A `TreeContext` is created by `ViewTree` and cloned into each node it
//! (transitively) creates. It carries:
//! - the change-notification stream towards the host UI
//! - the last-known paging limits, keyed by node id
//! - tree-wide options
//!
//! Its lifetime is the tree's lifetime; nothing here is process-global.

use crate::node::{same_node, NodeRef, WeakNodeRef};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// What the host UI should re-render
#[derive(Clone)]
pub enum TreeChange {
    /// Re-render this node's subtree
    Node(NodeRef),
    /// Re-render the whole tree
    All,
}

impl TreeChange {
    /// Id of the targeted node, `None` for whole-tree changes
    pub fn node_id(&self) -> Option<&str> {
        match self {
            TreeChange::Node(node) => Some(node.id()),
            TreeChange::All => None,
        }
    }
}

impl fmt::Debug for TreeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeChange::Node(node) => f.debug_tuple("Node").field(&node.id()).finish(),
            TreeChange::All => f.write_str("All"),
        }
    }
}

/// Tree-wide tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Items added per `show_more` round and initial window of pageable nodes
    pub default_page_size: usize,
    /// Capacity of the change broadcast channel
    pub channel_capacity: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            channel_capacity: 256,
        }
    }
}

/// Handle to the tree-owned shared state
#[derive(Clone)]
pub struct TreeContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    /// Change stream towards the host UI
    changes: broadcast::Sender<TreeChange>,

    /// Last-known paging limits: node id -> limit (`None` = unbounded)
    limits: DashMap<String, Option<usize>>,

    /// Nodes that exist in the hierarchy but are not shown by the host
    hidden: DashSet<String>,

    /// Current root, used to widen root notifications to `All`
    root: RwLock<Option<WeakNodeRef>>,

    options: RwLock<TreeOptions>,
}

impl TreeContext {
    pub fn new(options: TreeOptions) -> Self {
        let (changes, _) = broadcast::channel(options.channel_capacity.max(1));

        Self {
            inner: Arc::new(ContextInner {
                changes,
                limits: DashMap::new(),
                hidden: DashSet::new(),
                root: RwLock::new(None),
                options: RwLock::new(options),
            }),
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<TreeChange> {
        self.inner.changes.subscribe()
    }

    /// Emit a change notification
    ///
    /// Having no listener is not an error; the host may not be attached yet.
    pub fn notify(&self, change: TreeChange) {
        trace!("tree change: {:?}", change);
        let _ = self.inner.changes.send(change);
    }

    /// Emit a change scoped to `node`
    ///
    /// The root and hidden nodes cannot be targeted by the host, so their
    /// changes widen to a whole-tree notification.
    pub fn notify_node(&self, node: NodeRef) {
        if self.is_root(&node) || self.is_hidden(node.id()) {
            self.notify(TreeChange::All);
        } else {
            self.notify(TreeChange::Node(node));
        }
    }

    pub(crate) fn set_root(&self, root: Option<&NodeRef>) {
        *self.inner.root.write() = root.map(Arc::downgrade);
    }

    /// Whether `node` is the current root
    pub fn is_root(&self, node: &NodeRef) -> bool {
        match self.inner.root.read().as_ref().and_then(|weak| weak.upgrade()) {
            Some(root) => same_node(&root, node),
            None => false,
        }
    }

    /// Mark a node as present but not rendered (e.g. a splatted child)
    pub fn set_hidden(&self, id: &str, hidden: bool) {
        if hidden {
            self.inner.hidden.insert(id.to_string());
        } else {
            self.inner.hidden.remove(id);
        }
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.inner.hidden.contains(id)
    }

    /// Record the window a user paged a node to
    pub fn remember_limit(&self, id: &str, limit: Option<usize>) {
        self.inner.limits.insert(id.to_string(), limit);
    }

    /// Window a node was last paged to, if any
    pub fn last_known_limit(&self, id: &str) -> Option<Option<usize>> {
        self.inner.limits.get(id).map(|entry| *entry.value())
    }

    /// Initial window for a pageable node: the remembered one, else `default`
    pub fn initial_limit(&self, id: &str, default: Option<usize>) -> Option<usize> {
        self.last_known_limit(id).unwrap_or(default)
    }

    /// Forget remembered limits for `id` and everything beneath it
    ///
    /// Node ids are path-like (`parent/child`) with each segment escaped by
    /// `id_segment`, so the subtree is matched by prefix.
    pub fn forget_limits_under(&self, id: &str) -> usize {
        let prefix = format!("{}/", id);
        let before = self.inner.limits.len();
        self.inner
            .limits
            .retain(|key, _| key != id && !key.starts_with(&prefix));
        before - self.inner.limits.len()
    }

    pub fn options(&self) -> TreeOptions {
        self.inner.options.read().clone()
    }

    pub fn set_options(&self, options: TreeOptions) {
        *self.inner.options.write() = options;
    }

    pub fn default_page_size(&self) -> usize {
        self.inner.options.read().default_page_size
    }
}

impl Default for TreeContext {
    fn default() -> Self {
        Self::new(TreeOptions::default())
    }
}

//! Bounded breadth-first search over the view tree
//!
//! The walk materializes nodes as it goes, so its cost is capped:
//! - at most `max_depth` levels below the root are visited
//! - nodes on the last level are tested but never materialized
//! - pageable nodes are paged through (when allowed) but their children are
//!   never descended into
//!
//! Levels are two vectors swapped per depth. The cancellation token is
//! checked before every node and before every paging round; a cancelled
//! search returns `None` without touching the tree further.

use crate::error::{Result, ViewError};
use crate::node::NodeRef;
use crate::paging::{PageRequest, Pageable};
use crate::tree::ViewTree;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Async filter deciding whether a node's subtree is worth walking
pub type TraverseFn =
    Arc<dyn Fn(NodeRef) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Search bounds
#[derive(Clone)]
pub struct FindOptions {
    /// Page through pageable nodes until the target shows up
    pub allow_paging: bool,
    /// Deepest level visited (the root is level 0)
    pub max_depth: usize,
    pub token: CancellationToken,
    pub can_traverse: Option<TraverseFn>,
    /// Items requested per paging round; the tree's default page size if unset
    pub page_size: Option<usize>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            allow_paging: false,
            max_depth: 2,
            token: CancellationToken::new(),
            can_traverse: None,
            page_size: None,
        }
    }
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_paging(mut self, allow: bool) -> Self {
        self.allow_paging = allow;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Only walk below nodes for which `filter` resolves to true
    pub fn can_traverse<F>(mut self, filter: F) -> Self
    where
        F: Fn(NodeRef) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync + 'static,
    {
        self.can_traverse = Some(Arc::new(filter));
        self
    }
}

impl ViewTree {
    /// First node, breadth-first, for which `predicate` holds
    ///
    /// Returns `None` when nothing matched within the bounds, when the
    /// search was cancelled, or when the predicate or traversal filter
    /// failed.
    pub async fn find_node<P>(&self, predicate: P, options: FindOptions) -> Option<NodeRef>
    where
        P: Fn(&NodeRef) -> anyhow::Result<bool> + Send + Sync,
    {
        match self.search(&predicate, &options).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn search<P>(&self, predicate: &P, options: &FindOptions) -> Result<Option<NodeRef>>
    where
        P: Fn(&NodeRef) -> anyhow::Result<bool> + Send + Sync,
    {
        if options.token.is_cancelled() {
            debug!("Search cancelled before start");
            return Ok(None);
        }

        let page_size = options
            .page_size
            .unwrap_or_else(|| self.context().default_page_size())
            .max(1);

        let mut level = vec![self.root()];
        let mut next = Vec::new();
        let mut depth = 0;

        while !level.is_empty() && depth <= options.max_depth {
            trace!("Searching level {} ({} nodes)", depth, level.len());

            for node in level.drain(..) {
                if options.token.is_cancelled() {
                    debug!("Search cancelled at depth {}", depth);
                    return Ok(None);
                }

                if predicate(&node).map_err(ViewError::Search)? {
                    return Ok(Some(node));
                }

                if let Some(can_traverse) = &options.can_traverse {
                    if !can_traverse(node.clone()).await.map_err(ViewError::Search)? {
                        continue;
                    }
                }

                let pageable = node.as_pageable();
                if pageable.is_none() && depth >= options.max_depth {
                    // Children would lie past the bound
                    continue;
                }

                let children = match node.get_children().await {
                    Ok(children) => children,
                    Err(e) => {
                        warn!("Search skipping {}: {}", node.id(), e);
                        continue;
                    }
                };
                if children.is_empty() {
                    continue;
                }

                match pageable {
                    Some(pageable) => {
                        let found = self
                            .page_through(&node, pageable, children, predicate, options, page_size)
                            .await?;
                        if found.is_some() {
                            return Ok(found);
                        }
                    }
                    None => next.extend(children),
                }
            }

            std::mem::swap(&mut level, &mut next);
            depth += 1;
        }

        Ok(None)
    }

    /// Test a pageable node's window, growing it while allowed
    async fn page_through<P>(
        &self,
        node: &NodeRef,
        pageable: &dyn Pageable,
        mut children: Vec<NodeRef>,
        predicate: &P,
        options: &FindOptions,
        page_size: usize,
    ) -> Result<Option<NodeRef>>
    where
        P: Fn(&NodeRef) -> anyhow::Result<bool> + Send + Sync,
    {
        let mut stalled = false;
        loop {
            for child in &children {
                if predicate(child).map_err(ViewError::Search)? {
                    return Ok(Some(child.clone()));
                }
            }

            if stalled
                || !options.allow_paging
                || !pageable.has_more()
                || options.token.is_cancelled()
            {
                return Ok(None);
            }

            trace!("{}: paging by {}", node.id(), page_size);
            let before = pageable.limit();
            if !self.show_more(node, PageRequest::Count(page_size), None).await {
                return Ok(None);
            }

            let grown = match node.get_children().await {
                Ok(grown) => grown,
                Err(e) => {
                    warn!("Search stopped paging {}: {}", node.id(), e);
                    return Ok(None);
                }
            };

            // The new window is still tested once before giving up
            stalled = !window_grew(before, pageable.limit()) || same_window(&children, &grown);
            children = grown;
        }
    }
}

/// Whether a window limit moved forward
fn window_grew(before: Option<usize>, after: Option<usize>) -> bool {
    match (before, after) {
        (Some(before), Some(after)) => after > before,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn same_window(before: &[NodeRef], after: &[NodeRef]) -> bool {
    before.len() == after.len() && before.iter().zip(after).all(|(a, b)| a.id() == b.id())
}

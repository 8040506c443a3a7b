//! The repositories view
//!
//! `RepositoriesView` wires a `ViewTree` over the repositories root to the
//! host-side event streams:
//! - active-document changes (debounced) reveal the owning repository
//! - configuration changes (debounced) rebuild the tree with new settings
//!
//! It also provides the reveal helpers hosts use for navigation.

use crate::nodes::{repositories_root, RepositoriesNode, SourceRef, ROOT_ID};
use crate::settings::ViewSettings;
use crate::source::{is_within, normalize_path};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vista_core::{
    id_segment, FindOptions, Layout, NodeRef, RevealOptions, TreeContext, TreeOptions, ViewNode,
    ViewTree,
};
use vista_watcher::ChangeAggregator;

/// Settings snapshot shared with the root factory
type SharedSettings = Arc<RwLock<Arc<ViewSettings>>>;

pub struct RepositoriesView {
    tree: ViewTree,
    source: SourceRef,
    settings: SharedSettings,
    /// Typed handle to the current root
    root: Arc<Mutex<Weak<RepositoriesNode>>>,
    active_document: ChangeAggregator<Option<String>>,
    configuration: ChangeAggregator<ViewSettings>,
}

impl RepositoriesView {
    /// Build the view; must be called inside a tokio runtime
    pub fn new(source: SourceRef, settings: ViewSettings) -> Arc<Self> {
        let debounce = settings.debounce();
        let options = TreeOptions {
            default_page_size: settings.page_size,
            ..TreeOptions::default()
        };
        let shared: SharedSettings = Arc::new(RwLock::new(Arc::new(settings)));
        let typed_root = Arc::new(Mutex::new(Weak::new()));

        let factory = {
            let source = source.clone();
            let shared = shared.clone();
            let typed_root = typed_root.clone();
            move |context: &TreeContext| -> NodeRef {
                let settings = shared.read().clone();
                let root = repositories_root(source.clone(), settings, context.clone());
                *typed_root.lock() = Arc::downgrade(&root);
                root
            }
        };

        Arc::new_cyclic(|me: &Weak<RepositoriesView>| {
            let view = me.clone();
            let active_document = ChangeAggregator::spawn(
                "active-document",
                debounce,
                move |batch: Vec<Option<String>>| {
                    let Some(view) = view.upgrade() else {
                        return;
                    };
                    // Only the latest document matters
                    if let Some(Some(path)) = batch.into_iter().last() {
                        tokio::spawn(async move {
                            view.reveal_active_document(&path).await;
                        });
                    }
                },
            );

            let view = me.clone();
            let configuration = ChangeAggregator::spawn(
                "configuration",
                debounce,
                move |batch: Vec<ViewSettings>| {
                    if let (Some(view), Some(settings)) = (view.upgrade(), batch.into_iter().last()) {
                        view.apply_settings(settings);
                    }
                },
            );

            Self {
                tree: ViewTree::new(factory, options),
                source,
                settings: shared,
                root: typed_root,
                active_document,
                configuration,
            }
        })
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn settings(&self) -> Arc<ViewSettings> {
        self.settings.read().clone()
    }

    /// The current root, created on first use
    pub fn root(&self) -> Option<Arc<RepositoriesNode>> {
        self.tree.root();
        self.root.lock().upgrade()
    }

    /// Host reported a new active document (`None` when nothing is open)
    pub fn on_active_document_changed(&self, path: Option<String>) {
        self.active_document.push(path);
    }

    /// Host reported new settings; applied after the debounce window
    pub fn on_configuration_changed(&self, settings: ViewSettings) {
        if let Err(e) = settings.validate() {
            warn!("Ignoring invalid view settings: {}", e);
            return;
        }
        self.configuration.push(settings);
    }

    /// Switch to `settings` right away, rebuilding the tree
    ///
    /// Returns false when nothing changed.
    pub fn apply_settings(&self, settings: ViewSettings) -> bool {
        if *self.settings() == settings {
            return false;
        }
        info!("View settings changed, rebuilding tree");

        let mut options = self.tree.context().options();
        options.default_page_size = settings.page_size;
        self.tree.context().set_options(options);
        *self.settings.write() = Arc::new(settings);

        // Disposing the old root releases every subscription beneath it
        self.tree.reset_root();
        if self.tree.is_visible() {
            if let Some(subscribeable) = self.tree.root().as_subscribeable() {
                subscribeable.ensure_subscribed();
            }
        }
        true
    }

    async fn reveal_active_document(&self, path: &str) -> Option<NodeRef> {
        if !self.settings().auto_reveal || !self.tree.is_visible() {
            return None;
        }

        let repositories = match self.source.repositories().await {
            Ok(repositories) => repositories,
            Err(e) => {
                warn!("Cannot resolve repository for {}: {}", path, e);
                return None;
            }
        };

        // Innermost repository wins for nested checkouts
        let owner = repositories
            .into_iter()
            .filter(|repo| is_within(&repo.path, path))
            .max_by_key(|repo| normalize_path(&repo.path).len())?;

        debug!("Active document {} belongs to {}", path, owner.path);
        self.reveal_repository(&owner.path, RevealOptions::select()).await
    }

    /// Locate the row of repository `path`
    ///
    /// A splatted repository is not part of the rendered hierarchy; it is
    /// still returned, taken from the root directly.
    pub async fn find_repository(&self, path: &str) -> Option<NodeRef> {
        let key = normalize_path(path);
        let id = format!("{}/{}", ROOT_ID, id_segment(&key));

        let found = self
            .tree
            .find_node(move |node: &NodeRef| Ok(node.id() == id), FindOptions::new().max_depth(1))
            .await;
        if found.is_some() {
            return found;
        }

        let root = self.root()?;
        if root.layout() == Some(Layout::Splatted) {
            return root.child(&key).map(|node| node as NodeRef);
        }
        None
    }

    /// Reveal the row of repository `path`
    pub async fn reveal_repository(&self, path: &str, options: RevealOptions) -> Option<NodeRef> {
        let node = self.find_repository(path).await?;
        if !self.tree.context().is_hidden(node.id()) {
            self.tree.reveal(&node, options).await;
        }
        Some(node)
    }

    /// Reveal commit `sha` on `branch` of repository `repo`
    ///
    /// The branch window is paged until the commit shows up; only the path
    /// leading to the branch is walked.
    pub async fn reveal_commit(
        &self,
        repo: &str,
        branch: &str,
        sha: &str,
        options: RevealOptions,
        token: CancellationToken,
    ) -> Option<NodeRef> {
        let branch_id = format!(
            "{}/{}/branches/{}",
            ROOT_ID,
            id_segment(&normalize_path(repo)),
            id_segment(branch)
        );
        let target = format!("{}/{}", branch_id, sha);

        let find = FindOptions::new()
            .allow_paging(true)
            .max_depth(3)
            .token(token)
            .can_traverse(move |node: NodeRef| {
                let on_path = node.id() == branch_id
                    || branch_id.starts_with(&format!("{}/", node.id()));
                async move { Ok::<_, anyhow::Error>(on_path) }.boxed()
            });

        let node = self
            .tree
            .find_node(move |node: &NodeRef| Ok(node.id() == target), find)
            .await?;
        self.tree.reveal(&node, options).await;
        Some(node)
    }

    /// Stop listening and tear the tree down
    pub fn dispose(&self) {
        self.active_document.dispose();
        self.configuration.dispose();
        self.tree.dispose();
    }
}

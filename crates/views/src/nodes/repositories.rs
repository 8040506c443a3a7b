//! Root of the repositories view

use super::{contexts, RepositoryNode, SourceRef};
use crate::settings::ViewSettings;
use crate::source::RepositoryInfo;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use vista_core::{
    ChangeCallback, Collapsible, ContainerSource, DisplayRecord, ReconcilingContainerNode,
    Subscription, TreeContext, WeakNodeRef,
};
use vista_watcher::{ChangeAggregator, RepositorySetChanged};

/// Id of the repositories root
pub const ROOT_ID: &str = "repositories";

/// Open repositories, keyed by normalized path and ordered by index
pub type RepositoriesNode = ReconcilingContainerNode<RepositoriesSource>;

pub struct RepositoriesSource {
    source: SourceRef,
    settings: Arc<ViewSettings>,
}

impl RepositoriesSource {
    pub fn new(source: SourceRef, settings: Arc<ViewSettings>) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &Arc<ViewSettings> {
        &self.settings
    }
}

/// Root node listing every open repository
pub fn repositories_root(
    source: SourceRef,
    settings: Arc<ViewSettings>,
    context: TreeContext,
) -> Arc<RepositoriesNode> {
    ReconcilingContainerNode::new(ROOT_ID, None, context, RepositoriesSource::new(source, settings))
}

#[async_trait]
impl ContainerSource for RepositoriesSource {
    type Item = RepositoryInfo;
    type Child = RepositoryNode;

    async fn fetch(&self) -> anyhow::Result<Vec<RepositoryInfo>> {
        self.source.repositories().await
    }

    fn order(&self, item: &RepositoryInfo) -> usize {
        item.index
    }

    fn key(&self, item: &RepositoryInfo) -> String {
        item.key()
    }

    fn create(
        &self,
        item: RepositoryInfo,
        parent_id: &str,
        parent: WeakNodeRef,
        context: &TreeContext,
    ) -> Arc<RepositoryNode> {
        RepositoryNode::new(
            parent_id,
            item,
            self.source.clone(),
            self.settings.clone(),
            parent,
            context.clone(),
        )
    }

    fn update(&self, child: &Arc<RepositoryNode>, item: RepositoryInfo) {
        child.update(item);
    }

    fn describe(&self, id: &str) -> DisplayRecord {
        DisplayRecord::new(id, "Repositories", Collapsible::Expanded)
            .context_value(contexts::REPOSITORIES)
    }

    fn placeholder(&self) -> String {
        "No repositories could be found.".to_string()
    }

    fn splat(&self) -> bool {
        self.settings.splat_single_repository
    }

    fn subscribe(&self, on_change: ChangeCallback) -> Option<anyhow::Result<Subscription>> {
        let mut rx = self.source.watch_repositories();

        let aggregator = Arc::new(ChangeAggregator::spawn(
            ROOT_ID,
            self.settings.debounce(),
            move |batch: Vec<RepositorySetChanged>| {
                debug!("Repository set changed ({} events)", batch.len());
                on_change();
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
                        warn!("Missed {} repository-set events", skipped);
                        forward.push(RepositorySetChanged::default());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Some(Ok(Subscription::new(move || {
            task.abort();
            aggregator.dispose();
        })))
    }
}

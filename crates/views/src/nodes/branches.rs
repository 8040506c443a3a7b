//! The branches container of a repository

use super::{contexts, BranchNode, SourceRef};
use crate::settings::ViewSettings;
use crate::source::BranchInfo;
use async_trait::async_trait;
use std::sync::Arc;
use vista_core::{
    Collapsible, ContainerSource, DisplayRecord, ReconcilingContainerNode, TreeContext,
    WeakNodeRef,
};

/// Branches of one repository, keyed by name
pub type BranchesNode = ReconcilingContainerNode<BranchesSource>;

/// A branch together with its display position
pub struct BranchEntry {
    pub order: usize,
    pub info: BranchInfo,
}

pub struct BranchesSource {
    source: SourceRef,
    settings: Arc<ViewSettings>,
    repo: String,
}

impl BranchesSource {
    pub fn new(source: SourceRef, settings: Arc<ViewSettings>, repo: impl Into<String>) -> Self {
        Self {
            source,
            settings,
            repo: repo.into(),
        }
    }
}

/// Branches container of the repository row `repo_id`
pub fn branches_container(
    repo_id: &str,
    source: BranchesSource,
    parent: WeakNodeRef,
    context: TreeContext,
) -> Arc<BranchesNode> {
    ReconcilingContainerNode::new(format!("{}/branches", repo_id), Some(parent), context, source)
}

#[async_trait]
impl ContainerSource for BranchesSource {
    type Item = BranchEntry;
    type Child = BranchNode;

    async fn fetch(&self) -> anyhow::Result<Vec<BranchEntry>> {
        let mut branches = self.source.branches(&self.repo).await?;

        // Checked-out branch first, then by name
        branches.sort_by(|a, b| b.current.cmp(&a.current).then_with(|| a.name.cmp(&b.name)));
        Ok(branches
            .into_iter()
            .enumerate()
            .map(|(order, info)| BranchEntry { order, info })
            .collect())
    }

    fn order(&self, item: &BranchEntry) -> usize {
        item.order
    }

    fn key(&self, item: &BranchEntry) -> String {
        item.info.name.clone()
    }

    fn create(
        &self,
        item: BranchEntry,
        parent_id: &str,
        parent: WeakNodeRef,
        context: &TreeContext,
    ) -> Arc<BranchNode> {
        BranchNode::new(
            parent_id,
            self.repo.as_str(),
            item.info,
            self.source.clone(),
            self.settings.clone(),
            parent,
            context.clone(),
        )
    }

    fn update(&self, child: &Arc<BranchNode>, item: BranchEntry) {
        child.update(item.info);
    }

    fn describe(&self, id: &str) -> DisplayRecord {
        DisplayRecord::new(id, "Branches", Collapsible::Collapsed)
            .icon("branches")
            .context_value(contexts::BRANCHES)
    }

    fn placeholder(&self) -> String {
        "No branches could be found.".to_string()
    }
}

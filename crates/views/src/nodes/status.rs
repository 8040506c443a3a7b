//! Working-tree status row of a repository

use super::{commands, contexts, SourceRef};
use async_trait::async_trait;
use std::sync::Arc;
use vista_core::{
    Collapsible, CommandDescriptor, DisplayRecord, NodeBase, NodeRef, NodeState, TreeContext,
    ViewError, ViewNode, WeakNodeRef,
};

/// Leaf summarizing staged / unstaged / untracked changes
///
/// The summary is read on every render, so a repository refresh only needs
/// to re-render this row.
pub struct StatusNode {
    base: NodeBase,
    source: SourceRef,
    repo: String,
}

impl StatusNode {
    pub fn new(
        repo_id: &str,
        repo: impl Into<String>,
        source: SourceRef,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(format!("{}/status", repo_id), Some(parent), context),
            source,
            repo: repo.into(),
        })
    }
}

#[async_trait]
impl ViewNode for StatusNode {
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
        let status = self
            .source
            .status(&self.repo)
            .await
            .map_err(|e| ViewError::compute(self.id(), e))?;

        let label = match status.changed() {
            0 => "No changes".to_string(),
            1 => "1 change".to_string(),
            n => format!("{} changes", n),
        };

        let parts: Vec<String> = [
            (status.staged, "staged"),
            (status.unstaged, "unstaged"),
            (status.untracked, "untracked"),
            (status.conflicts, "conflicted"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, what)| format!("{} {}", count, what))
        .collect();

        let icon = if status.conflicts > 0 {
            "warning"
        } else if status.is_clean() {
            "check"
        } else {
            "diff"
        };

        let mut record = DisplayRecord::new(self.id(), label, Collapsible::None)
            .icon(icon)
            .context_value(contexts::STATUS)
            .command(CommandDescriptor::new(commands::SHOW_STATUS).arg(self.repo.as_str()));
        if !parts.is_empty() {
            record = record.description(parts.join(", "));
        }
        Ok(record)
    }

    fn dispose(&self) {
        self.base.dispose();
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }
}

//! Changed-file rows under a commit

use super::{commands, contexts};
use crate::source::FileChange;
use async_trait::async_trait;
use std::sync::Arc;
use vista_core::{
    id_segment, Collapsible, CommandDescriptor, DisplayRecord, NodeBase, NodeRef, NodeState,
    TreeContext, ViewNode, WeakNodeRef,
};

pub struct FileNode {
    base: NodeBase,
    repo: String,
    sha: String,
    change: FileChange,
}

impl FileNode {
    pub fn new(
        parent_id: &str,
        repo: impl Into<String>,
        sha: impl Into<String>,
        change: FileChange,
        parent: WeakNodeRef,
        context: TreeContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(
                format!("{}/{}", parent_id, id_segment(&change.path)),
                Some(parent),
                context,
            ),
            repo: repo.into(),
            sha: sha.into(),
            change,
        })
    }

    pub fn change(&self) -> &FileChange {
        &self.change
    }
}

#[async_trait]
impl ViewNode for FileNode {
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
        let path = &self.change.path;
        let (directory, name) = match path.rsplit_once('/') {
            Some((directory, name)) => (Some(directory), name),
            None => (None, path.as_str()),
        };

        let mut record = DisplayRecord::new(self.id(), name, Collapsible::None)
            .tooltip(format!("{} ({:?})", path, self.change.status))
            .icon(format!("status-{}", self.change.status.code()))
            .context_value(contexts::FILE)
            .command(
                CommandDescriptor::new(commands::OPEN_FILE_CHANGES)
                    .arg(self.repo.as_str())
                    .arg(self.sha.as_str())
                    .arg(path.as_str()),
            );
        if let Some(directory) = directory {
            record = record.description(directory);
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

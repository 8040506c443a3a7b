//! Informational leaf nodes

use crate::context::TreeContext;
use crate::error::Result;
use crate::node::{Collapsible, DisplayRecord, NodeBase, NodeRef, NodeState, ViewNode, WeakNodeRef};
use async_trait::async_trait;
use std::sync::Arc;

/// Context value carried by every message node
pub const MESSAGE_CONTEXT: &str = "message";

/// Leaf that only shows a message (placeholder for empty collections)
pub struct MessageNode {
    base: NodeBase,
    message: String,
}

impl MessageNode {
    /// Placeholder child of `parent_id`; its id is `<parent_id>/message`
    pub fn new(
        parent_id: &str,
        message: impl Into<String>,
        parent: Option<WeakNodeRef>,
        context: TreeContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(format!("{}/message", parent_id), parent, context),
            message: message.into(),
        })
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
impl ViewNode for MessageNode {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.base.parent()
    }

    async fn get_children(&self) -> Result<Vec<NodeRef>> {
        Ok(Vec::new())
    }

    async fn display_record(&self) -> Result<DisplayRecord> {
        Ok(
            DisplayRecord::new(self.id(), self.message.clone(), Collapsible::None)
                .context_value(MESSAGE_CONTEXT),
        )
    }

    fn dispose(&self) {
        self.base.dispose();
    }

    fn state(&self) -> NodeState {
        self.base.state()
    }
}

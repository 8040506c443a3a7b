//! Error types for the view-tree engine

use thiserror::Error;

/// Failures raised inside the view tree
///
/// None of these are fatal to the tree: `ViewTree` catches them at the
/// boundary that invoked the failing operation and logs them.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The node was disposed while (or before) the operation ran
    #[error("node {0} has been disposed")]
    Disposed(String),

    /// Computing children, a display record or a refresh failed
    #[error("failed to compute node {id}: {source:#}")]
    Compute {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Binding a node to its change source failed
    #[error("failed to subscribe node {id}: {source:#}")]
    Subscription {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The host failed to reveal a node
    #[error("failed to reveal node {id}: {source:#}")]
    Reveal {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A search predicate or traversal filter failed
    #[error("search aborted: {0:#}")]
    Search(#[source] anyhow::Error),

    /// The node does not support the requested capability
    #[error("node {id} is not {capability}")]
    Unsupported { id: String, capability: &'static str },

    /// Any other collaborator failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ViewError {
    /// Wrap a collaborator error raised while computing `id`
    pub fn compute(id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ViewError::Compute {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Wrap a collaborator error raised while subscribing `id`
    pub fn subscription(id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ViewError::Subscription {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Wrap a host error raised while revealing `id`
    pub fn reveal(id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ViewError::Reveal {
            id: id.into(),
            source: source.into(),
        }
    }
}

/// Result type for view-tree operations
pub type Result<T> = std::result::Result<T, ViewError>;

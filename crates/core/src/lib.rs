//! View-tree engine for version-control side panels
//!
//! This crate provides:
//! - The node contract, per-node child caches and disposal (`node`)
//! - Paging and lazy subscription capabilities
//! - Identity-preserving reconciliation of live collections (`container`)
//! - The `ViewTree` orchestrator: notifications, reveal, paging memory
//! - Bounded, cancellable breadth-first search (`find_node`)
//!
//! Concrete node kinds live in `vista-views`; this crate knows nothing about
//! repositories.

pub mod container;
pub mod context;
pub mod error;
pub mod message;
pub mod node;
pub mod paging;
pub mod search;
pub mod subscription;
pub mod tree;

#[cfg(test)]
mod testing;

// Re-exports
pub use container::{ChangeCallback, ContainerSource, Layout, ReconcilingContainerNode};
pub use context::{TreeChange, TreeContext, TreeOptions};
pub use error::{Result, ViewError};
pub use message::{MessageNode, MESSAGE_CONTEXT};
pub use node::{
    dispose_all, id_segment, same_node, ChildCache, Collapsible, CommandDescriptor, DisplayRecord, NodeBase,
    NodeRef, NodeState, RefreshOutcome, ViewNode, WeakNodeRef,
};
pub use paging::{PageRequest, Pageable, PagingState};
pub use search::{FindOptions, TraverseFn};
pub use subscription::{Subscribeable, Subscription, SubscriptionHandle};
pub use tree::{Expand, HostView, RevealOptions, RootFactory, ViewTree};

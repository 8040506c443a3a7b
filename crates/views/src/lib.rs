//! Repository views built on the Vista view-tree engine
//!
//! This crate provides:
//! - The `RepositorySource` data-source contract and an in-memory source
//! - Concrete node kinds (repositories, repository, status, branches,
//!   branch, commit, file)
//! - `RepositoriesView`: auto-reveal, configuration reloads, reveal helpers
//! - `ViewSettings`

pub mod memory;
pub mod nodes;
pub mod settings;
pub mod source;
pub mod view;

// Re-exports
pub use memory::{BranchData, CommitData, InMemorySource, RepositoryData};
pub use settings::{SettingsError, ViewSettings};
pub use source::{
    normalize_path, BranchInfo, CommitInfo, CommitPage, FileChange, FileStatus, RepositoryInfo,
    RepositorySource, StatusSummary,
};
pub use view::RepositoriesView;

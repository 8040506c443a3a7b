//! Node kinds of the repositories view
//!
//! Hierarchy:
//! - repositories (root, reconciling, may splat a lone repository)
//!   - repository (subscribed to its change reasons)
//!     - status
//!     - branches (reconciling, keyed by branch name)
//!       - branch (pageable commit window, trailing "load more" row)
//!         - commit
//!           - file

pub mod branch;
pub mod branches;
pub mod commit;
pub mod file;
pub mod repositories;
pub mod repository;
pub mod status;

pub use branch::{BranchNode, LoadMoreNode};
pub use branches::{branches_container, BranchEntry, BranchesNode, BranchesSource};
pub use commit::CommitNode;
pub use file::FileNode;
pub use repositories::{repositories_root, RepositoriesNode, RepositoriesSource, ROOT_ID};
pub use repository::RepositoryNode;
pub use status::StatusNode;

use crate::source::RepositorySource;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Shared handle to the injected data source
pub type SourceRef = Arc<dyn RepositorySource>;

/// Host-side discriminators carried in display records
pub mod contexts {
    pub const REPOSITORIES: &str = "repositories";
    pub const REPOSITORY: &str = "repository";
    pub const STATUS: &str = "status";
    pub const BRANCHES: &str = "branches";
    pub const BRANCH: &str = "branch";
    pub const BRANCH_CURRENT: &str = "branch+current";
    pub const LOAD_MORE: &str = "load-more";
    pub const COMMIT: &str = "commit";
    pub const FILE: &str = "file";
}

/// Commands attached to rows; the host decides what they do
pub mod commands {
    pub const SHOW_MORE: &str = "vista.showMore";
    pub const SHOW_STATUS: &str = "vista.showStatus";
    pub const SHOW_COMMIT: &str = "vista.showCommit";
    pub const OPEN_FILE_CHANGES: &str = "vista.openFileChanges";
}

/// Human-friendly age of `date` as seen at `now`
pub fn relative_time(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(date);
    if age < Duration::minutes(1) {
        return "just now".to_string();
    }

    let (count, unit) = if age < Duration::hours(1) {
        (age.num_minutes(), "minute")
    } else if age < Duration::days(1) {
        (age.num_hours(), "hour")
    } else if age < Duration::days(30) {
        (age.num_days(), "day")
    } else {
        return format!("on {}", date.format("%Y-%m-%d"));
    };

    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

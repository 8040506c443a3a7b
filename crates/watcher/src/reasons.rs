//! Repository change reasons
//!
//! Data sources report *why* a repository changed; views use the reason to
//! pick between a cheap scoped refresh and a full teardown (configuration).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Why a repository changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    /// Repository configuration changed (remotes config, user settings, ...)
    Config,
    /// Branch heads moved
    Heads,
    /// Remotes were added, removed or fetched
    Remotes,
    /// Working tree index changed
    Index,
    /// Source could not classify the change
    Unknown,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeReason::Config => "config",
            ChangeReason::Heads => "heads",
            ChangeReason::Remotes => "remotes",
            ChangeReason::Index => "index",
            ChangeReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Sorted, de-duplicated set of change reasons
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChangeReason>", into = "Vec<ChangeReason>")]
pub struct ChangeReasons(SmallVec<[ChangeReason; 4]>);

impl ChangeReasons {
    /// Empty set
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Set holding a single reason
    pub fn single(reason: ChangeReason) -> Self {
        let mut reasons = Self::new();
        reasons.insert(reason);
        reasons
    }

    /// Add a reason (no-op if already present)
    pub fn insert(&mut self, reason: ChangeReason) {
        if let Err(pos) = self.0.binary_search(&reason) {
            self.0.insert(pos, reason);
        }
    }

    /// Union with another set
    pub fn merge(&mut self, other: &ChangeReasons) {
        for &reason in other.iter() {
            self.insert(reason);
        }
    }

    /// Check for a specific reason
    pub fn contains(&self, reason: ChangeReason) -> bool {
        self.0.binary_search(&reason).is_ok()
    }

    /// Check whether any of `reasons` is present
    pub fn contains_any(&self, reasons: &[ChangeReason]) -> bool {
        reasons.iter().any(|&r| self.contains(r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeReason> {
        self.0.iter()
    }
}

impl FromIterator<ChangeReason> for ChangeReasons {
    fn from_iter<I: IntoIterator<Item = ChangeReason>>(iter: I) -> Self {
        let mut reasons = Self::new();
        for reason in iter {
            reasons.insert(reason);
        }
        reasons
    }
}

impl From<Vec<ChangeReason>> for ChangeReasons {
    fn from(reasons: Vec<ChangeReason>) -> Self {
        reasons.into_iter().collect()
    }
}

impl From<ChangeReasons> for Vec<ChangeReason> {
    fn from(reasons: ChangeReasons) -> Self {
        reasons.0.into_vec()
    }
}

impl fmt::Display for ChangeReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", reason)?;
        }
        Ok(())
    }
}

/// A change reported for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryChange {
    /// Repository path as reported by the data source
    pub path: String,
    /// Why it changed
    pub reasons: ChangeReasons,
}

impl RepositoryChange {
    pub fn new(path: impl Into<String>, reasons: impl IntoIterator<Item = ChangeReason>) -> Self {
        Self {
            path: path.into(),
            reasons: reasons.into_iter().collect(),
        }
    }

    /// Check whether the change carries any of `reasons`
    pub fn changed(&self, reasons: &[ChangeReason]) -> bool {
        self.reasons.contains_any(reasons)
    }

    /// Merge a debounced batch into one change per repository
    ///
    /// Order follows the first appearance of each path in the batch.
    pub fn coalesce(batch: Vec<RepositoryChange>) -> Vec<RepositoryChange> {
        let mut merged: Vec<RepositoryChange> = Vec::with_capacity(batch.len());

        for change in batch {
            match merged.iter_mut().find(|c| c.path == change.path) {
                Some(existing) => existing.reasons.merge(&change.reasons),
                None => merged.push(change),
            }
        }

        merged
    }
}

/// The set of open repositories changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySetChanged {
    /// Paths of repositories that appeared
    pub added: Vec<String>,
    /// Paths of repositories that went away
    pub removed: Vec<String>,
}

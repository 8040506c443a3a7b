//! Fixture files
//!
//! A fixture is a TOML description of a set of repositories plus an optional
//! script of events to replay against them:
//!
//! ```toml
//! [views]
//! page_size = 2
//!
//! [[repositories]]
//! path = "/work/app"
//! status = { staged = 1 }
//!
//! [[repositories.branches]]
//! name = "main"
//! current = true
//!
//! [[events]]
//! kind = "change"
//! path = "/work/app"
//! reasons = ["index"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use vista_views::{InMemorySource, RepositoriesView, RepositoryData, ViewSettings};
use vista_watcher::ChangeReason;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Overrides the system configuration when present
    pub views: Option<ViewSettings>,
    pub repositories: Vec<RepositoryData>,
    pub events: Vec<FixtureEvent>,
}

/// One scripted step of a replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FixtureEvent {
    /// Open a repository
    Open { repository: RepositoryData },
    /// Close the repository at `path`
    Close { path: String },
    /// Report change reasons for `path`
    Change { path: String, reasons: Vec<ChangeReason> },
    /// Switch the active document
    Document {
        #[serde(default)]
        path: Option<String>,
    },
}

impl std::fmt::Display for FixtureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixtureEvent::Open { repository } => write!(f, "open {}", repository.path),
            FixtureEvent::Close { path } => write!(f, "close {}", path),
            FixtureEvent::Change { path, reasons } => {
                let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                write!(f, "change {} ({})", path, reasons.join(", "))
            }
            FixtureEvent::Document { path: Some(path) } => write!(f, "document {}", path),
            FixtureEvent::Document { path: None } => write!(f, "document (none)"),
        }
    }
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid fixture {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let fixture: Fixture = toml::from_str(text)?;
        if let Some(views) = &fixture.views {
            views.validate()?;
        }
        Ok(fixture)
    }

    /// Fixture settings, else `fallback`
    pub fn settings(&self, fallback: ViewSettings) -> ViewSettings {
        self.views.clone().unwrap_or(fallback)
    }

    /// Fresh source holding the fixture's repositories
    pub fn source(&self) -> Arc<InMemorySource> {
        Arc::new(InMemorySource::with_repositories(self.repositories.iter().cloned()))
    }
}

/// Apply one event to `source` (and `view`, for document events)
pub fn apply(event: &FixtureEvent, source: &InMemorySource, view: &RepositoriesView) {
    debug!("Applying event: {}", event);
    match event {
        FixtureEvent::Open { repository } => {
            if source.open_repository(repository.clone()).is_none() {
                warn!("{} is already open", repository.path);
            }
        }
        FixtureEvent::Close { path } => {
            if !source.close_repository(path) {
                warn!("{} is not open", path);
            }
        }
        FixtureEvent::Change { path, reasons } => source.notify_change(path, reasons),
        FixtureEvent::Document { path } => view.on_active_document_changed(path.clone()),
    }
}

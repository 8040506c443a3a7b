//! CLI command implementations

pub mod config;
pub mod find;
pub mod replay;
pub mod tree;

use crate::fixture::Fixture;
use crate::system_config;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use vista_views::{InMemorySource, RepositoriesView, ViewSettings};

/// A view over a loaded fixture
pub struct Session {
    pub fixture: Fixture,
    pub source: Arc<InMemorySource>,
    pub view: Arc<RepositoriesView>,
    pub settings: ViewSettings,
}

impl Session {
    /// Load `fixture` and build a visible view over it
    ///
    /// Settings come from the fixture, else the system config; `page_size`
    /// overrides either.
    pub fn open(fixture: &Path, page_size: Option<usize>) -> Result<Self> {
        let fixture = Fixture::load(fixture)?;
        let config = system_config::load().context("Failed to load system configuration")?;

        let mut settings = fixture.settings(config.views);
        if let Some(page_size) = page_size {
            settings.page_size = page_size;
        }
        settings.validate().context("Invalid view settings")?;

        let source = fixture.source();
        let view = RepositoriesView::new(source.clone(), settings.clone());
        view.tree().set_visible(true);

        Ok(Self {
            fixture,
            source,
            view,
            settings,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.view.dispose();
    }
}

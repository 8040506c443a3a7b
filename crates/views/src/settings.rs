//! View settings
//!
//! Settings are plain serde data, read from the `[views]` table of the
//! configuration file. Every field has a default, so a partial (or empty)
//! table is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a settings value was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("page_size must be between 1 and 1000 (got {0})")]
    PageSize(usize),

    #[error("debounce_ms must be between 0 and 10000 (got {0})")]
    Debounce(u64),
}

/// Behaviour of the repository views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Commits shown per branch before "load more"
    pub page_size: usize,

    /// Quiet period for bursty events, in milliseconds
    pub debounce_ms: u64,

    /// Show a lone repository's contents directly under the root
    pub splat_single_repository: bool,

    /// Show the working-tree status row
    pub show_status: bool,

    /// Reveal the repository owning the active document
    pub auto_reveal: bool,

    /// Expand the checked-out branch by default
    pub expand_current_branch: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            debounce_ms: 250,
            splat_single_repository: true,
            show_status: true,
            auto_reveal: true,
            expand_current_branch: true,
        }
    }
}

impl ViewSettings {
    /// Validate value ranges
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=1000).contains(&self.page_size) {
            return Err(SettingsError::PageSize(self.page_size));
        }
        if self.debounce_ms > 10_000 {
            return Err(SettingsError::Debounce(self.debounce_ms));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse and validate settings from TOML
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let settings: ViewSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

//! System-wide configuration
//!
//! Stored as TOML at `<config dir>/vista/config.toml`; `VISTA_CONFIG`
//! overrides the location. A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use vista_views::ViewSettings;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "VISTA_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub views: ViewSettings,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        self.views.validate()?;
        Ok(())
    }
}

/// Location of the config file, if one can be determined
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("vista").join("config.toml"))
}

/// Load the config, falling back to defaults when the file is missing
pub fn load() -> Result<SystemConfig> {
    match config_file_path() {
        Some(path) => load_from(&path),
        None => Ok(SystemConfig::default()),
    }
}

pub fn load_from(path: &Path) -> Result<SystemConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(SystemConfig::default());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: SystemConfig = toml::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

pub fn save(config: &SystemConfig) -> Result<()> {
    let path = config_file_path().context("Could not determine config file path")?;
    save_to(config, &path)
}

pub fn save_to(config: &SystemConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write the example config unless a file already exists
pub fn init_if_missing() -> Result<PathBuf> {
    let path = config_file_path().context("Could not determine config file path")?;
    if !path.exists() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        std::fs::write(&path, example_config())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(path)
}

pub fn example_config() -> String {
    r#"# vista configuration

[views]
# Commits shown per branch before "load more" (1-1000)
page_size = 20

# Quiet period for bursty change events, in milliseconds (0-10000)
debounce_ms = 250

# Show a lone repository's contents directly under the root
splat_single_repository = true

# Show the working-tree status row under each repository
show_status = true

# Reveal the repository owning the active document
auto_reveal = true

# Expand the checked-out branch by default
expand_current_branch = true
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: SystemConfig = toml::from_str(&example_config()).unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SystemConfig::default();
        config.views.page_size = 7;
        config.views.auto_reveal = false;
        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[views]\npage_size = 0\n").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("page_size"));
    }
}

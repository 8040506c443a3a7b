//! Configuration management command
//!
//! Provides CLI interface to view and edit the `[views]` settings.

use crate::system_config::{self, SystemConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

/// Keys accepted by `get` and `set`
pub const KEYS: &[&str] = &[
    "views.page_size",
    "views.debounce_ms",
    "views.splat_single_repository",
    "views.show_status",
    "views.auto_reveal",
    "views.expand_current_branch",
];

/// List all configuration values
pub async fn run_list() -> Result<()> {
    let config = system_config::load()?;
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    println!("{}", "Vista Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("{}", "[views]".yellow());
    for key in KEYS {
        let value = get_value(&config, key)?;
        let name = key.trim_start_matches("views.");
        if *key == "views.debounce_ms" {
            println!(
                "  {} = {} {}",
                name.cyan(),
                value,
                format!("({}ms)", value).dimmed()
            );
        } else {
            println!("  {} = {}", name.cyan(), value);
        }
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  page_size: 1-1000");
    println!("  debounce_ms: 0-10,000");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(key: &str) -> Result<()> {
    let config = system_config::load()?;
    println!("{}", get_value(&config, key)?);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load()?;
    set_value(&mut config, key, value)?;

    config.validate().context("Invalid configuration value")?;
    system_config::save(&config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(create: bool) -> Result<()> {
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    if create && !config_path.exists() {
        system_config::init_if_missing()?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}

pub fn get_value(config: &SystemConfig, key: &str) -> Result<String> {
    let views = &config.views;
    let value = match key {
        "views.page_size" => views.page_size.to_string(),
        "views.debounce_ms" => views.debounce_ms.to_string(),
        "views.splat_single_repository" => views.splat_single_repository.to_string(),
        "views.show_status" => views.show_status.to_string(),
        "views.auto_reveal" => views.auto_reveal.to_string(),
        "views.expand_current_branch" => views.expand_current_branch.to_string(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'vista config --list' to see available keys.",
            key
        ),
    };
    Ok(value)
}

pub fn set_value(config: &mut SystemConfig, key: &str, value: &str) -> Result<()> {
    let views = &mut config.views;
    match key {
        "views.page_size" => {
            views.page_size = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "views.debounce_ms" => {
            views.debounce_ms = value
                .parse()
                .context("Invalid value: must be a non-negative integer")?;
        }
        "views.splat_single_repository" => views.splat_single_repository = parse_bool(value)?,
        "views.show_status" => views.show_status = parse_bool(value)?,
        "views.auto_reveal" => views.auto_reveal = parse_bool(value)?,
        "views.expand_current_branch" => views.expand_current_branch = parse_bool(value)?,
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'vista config --list' to see available keys.",
            key
        ),
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse()
        .context("Invalid value: must be 'true' or 'false'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_round_trips() {
        let config = SystemConfig::default();
        for key in KEYS {
            let mut copy = config.clone();
            let value = get_value(&config, key).unwrap();
            set_value(&mut copy, key, &value).unwrap();
            assert_eq!(copy, config, "{}", key);
        }
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = SystemConfig::default();

        assert!(set_value(&mut config, "views.page_size", "many").is_err());
        assert!(set_value(&mut config, "views.auto_reveal", "yes").is_err());
        assert!(set_value(&mut config, "views.colour", "red").is_err());

        set_value(&mut config, "views.page_size", "0").unwrap();
        assert!(config.validate().is_err());
    }
}

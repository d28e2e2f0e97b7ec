//! Setup module for initial application configuration.
//!
//! Handles first-run setup by creating the config file from the bundled template,
//! and re-stamping the config version after an upgrade.

pub mod version;

use std::path::Path;

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/readaloud.toml");

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writes the default config with a version prefix.
///
/// An existing file is left alone, so an upgrade never loses backend settings.
///
/// # Errors
/// Returns an error if any file operations fail.
pub fn run_setup(config_path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if config_path.exists() {
        tracing::debug!("Keeping existing config at {}", config_path.display());
        return Ok(());
    }

    let config_with_version = format!(r#"config_version = "{}""#, CURRENT_VERSION);
    let full_config = format!("{}\n{}", config_with_version, DEFAULT_CONFIG);
    std::fs::write(config_path, full_config)?;
    tracing::info!("Created default config at {}", config_path.display());

    Ok(())
}

/// Runs setup when the config is missing or older than this build.
pub fn check_and_run_setup(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        tracing::info!("No config found, running first-time setup");
        return run_setup(config_path);
    }

    match version::check_setup_needed(config_path)? {
        Some(old_version) => {
            tracing::info!(
                "Setup needed - migrating from version {} to {}",
                old_version,
                CURRENT_VERSION
            );
            run_setup(config_path)?;
            version::update_config_version(config_path)?;
            tracing::info!("Setup completed - migrated to version {}", CURRENT_VERSION);
        }
        None => {
            tracing::debug!("Config version up to date ({})", CURRENT_VERSION);
        }
    }
    Ok(())
}

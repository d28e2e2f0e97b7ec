//! Configuration file management for readaloud.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio capture and playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Input device to record from. Options:
    /// - "default" for the system default device
    /// - numeric index (0, 1, 2, etc.) in host enumeration order
    /// - device name
    pub device: String,
    /// Requested recording sample rate in Hz (actual may differ based on device)
    pub sample_rate: u32,
    /// Recording format string: "codec [ffmpeg_options]" (e.g., "aac -b:a 128k")
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// How often the player reports position while a sample is loaded
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_output_format() -> String {
    "aac -b:a 128k".to_string()
}

fn default_status_interval_ms() -> u64 {
    100
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 44100,
            output_format: default_output_format(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

/// Firebase project the account, profile and storage calls go to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Web API key of the project
    #[serde(default)]
    pub api_key: String,
    /// Project id, used for Firestore document paths
    #[serde(default)]
    pub project_id: String,
    /// Storage bucket, e.g. "my-app.appspot.com"
    #[serde(default)]
    pub storage_bucket: String,
}

impl BackendConfig {
    /// Names of required settings that are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("backend.api_key", &self.api_key),
            ("backend.project_id", &self.project_id),
            ("backend.storage_bucket", &self.storage_bucket),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Upper bound for each upload, delete and profile write, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadaloudConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl ReadaloudConfig {
    /// Reads `path`.
    ///
    /// # Errors
    /// - If the config file cannot be read
    /// - If the TOML is malformed
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        let config: ReadaloudConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration in {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Saves configuration to `path`, keeping the version line first.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let body = toml::to_string_pretty(self)?;
        let content = format!(
            "config_version = \"{}\"\n{}",
            env!("CARGO_PKG_VERSION"),
            body
        );
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

fn home_dir() -> Result<PathBuf, std::io::Error> {
    dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })
}

/// Retrieves the path to the config file, creating its directory.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn config_path() -> Result<PathBuf, std::io::Error> {
    let config_dir = home_dir()?.join(".config").join("readaloud");
    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("readaloud.toml"))
}

/// Directory for the persisted session and temporary recordings.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = dirs::data_local_dir()
        .map(Ok)
        .unwrap_or_else(|| home_dir().map(|h| h.join(".local").join("share")))?
        .join("readaloud");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

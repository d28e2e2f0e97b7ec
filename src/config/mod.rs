//! Configuration management for readaloud.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory; the signed-in session is
//! kept separately in the local data directory.

pub mod file;

pub use file::{config_path, data_dir, AudioConfig, BackendConfig, NetworkConfig, ReadaloudConfig};

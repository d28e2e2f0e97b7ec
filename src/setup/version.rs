//! Config version stamping.
//!
//! The first line of `readaloud.toml` records which build wrote it. A config stamped
//! by an older build (or not stamped at all) triggers setup on the next start.

use anyhow::anyhow;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reported for a config that predates version stamping.
const LEGACY: &str = "unknown (legacy config)";

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct SemanticVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemanticVersion {
    /// Parses "major.minor.patch". Pre-release suffixes are not accepted.
    fn parse(version_str: &str) -> anyhow::Result<Self> {
        let mut parts = version_str.trim().split('.');
        let mut next = |name: &str| -> anyhow::Result<u32> {
            let part = parts
                .next()
                .ok_or_else(|| anyhow!("Invalid version format: '{version_str}'"))?;
            part.parse::<u32>()
                .map_err(|_| anyhow!("Invalid {name} version: '{part}'"))
        };
        let version = SemanticVersion {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        };
        if parts.next().is_some() {
            return Err(anyhow!(
                "Invalid version format: '{}'. Expected 'major.minor.patch'",
                version_str
            ));
        }
        Ok(version)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The version stamped on the first line of `content`, if any.
///
/// The line must start with optional whitespace followed by `config_version` (not a comment).
fn stamped_version(content: &str) -> anyhow::Result<Option<String>> {
    let Some(first_line) = content.lines().next() else {
        return Ok(None);
    };
    let regex = Regex::new(r#"^\s*config_version\s*=\s*"([^"]+)""#)?;
    Ok(regex
        .captures(first_line)
        .map(|caps| caps[1].to_string()))
}

/// Returns the version the config was written by when setup should run.
///
/// `None` means the file is missing or already current. A config written by a newer
/// build is left alone.
pub fn check_setup_needed(config_path: &Path) -> anyhow::Result<Option<String>> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(config_path)?;
    let Some(config_version) = stamped_version(&content)? else {
        return Ok(Some(LEGACY.to_string()));
    };

    let config_parsed = SemanticVersion::parse(&config_version)?;
    let current_parsed = SemanticVersion::parse(CURRENT_VERSION)?;
    match config_parsed.cmp(&current_parsed) {
        Ordering::Less => Ok(Some(config_parsed.to_string())),
        Ordering::Equal => Ok(None),
        Ordering::Greater => {
            tracing::warn!(
                "Config version {} is newer than app version {}",
                config_version,
                CURRENT_VERSION
            );
            Ok(None)
        }
    }
}

/// Rewrites the file with the current version as its first line, keeping the rest.
pub fn update_config_version(config_path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;

    let lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().starts_with("config_version"))
        .collect();

    let version_line = format!(r#"config_version = "{}""#, CURRENT_VERSION);
    let new_content = if lines.is_empty() {
        version_line
    } else {
        format!("{}\n{}", version_line, lines.join("\n"))
    };

    std::fs::write(config_path, new_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_version_parse() {
        let v = SemanticVersion::parse("0.1.5").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (0, 1, 5));
        assert_eq!(v.to_string(), "0.1.5");
    }

    #[test]
    fn test_semantic_version_comparison() {
        let v1 = SemanticVersion::parse("0.0.4").unwrap();
        let v2 = SemanticVersion::parse("0.0.5").unwrap();
        let v3 = SemanticVersion::parse("0.1.0").unwrap();

        assert!(v1 < v2);
        assert!(v2 < v3);
    }

    #[test]
    fn test_invalid_version_format() {
        assert!(SemanticVersion::parse("0.0").is_err());
        assert!(SemanticVersion::parse("0.0.5.1").is_err());
        assert!(SemanticVersion::parse("invalid").is_err());
    }

    #[test]
    fn only_the_first_line_counts() {
        let stamped = |content: &str| stamped_version(content).unwrap();
        assert_eq!(
            stamped("config_version = \"1.2.3\"\n[audio]\n"),
            Some("1.2.3".to_string())
        );
        assert_eq!(stamped("# config_version = \"1.2.3\""), None);
        assert_eq!(stamped("[audio]\nconfig_version = \"1.2.3\""), None);
        assert_eq!(stamped(""), None);
    }

    #[test]
    fn unstamped_config_is_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readaloud.toml");
        std::fs::write(&path, "[audio]\ndevice = \"default\"\n").unwrap();
        assert_eq!(check_setup_needed(&path).unwrap().as_deref(), Some(LEGACY));

        update_config_version(&path).unwrap();
        assert!(check_setup_needed(&path).unwrap().is_none());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("device = \"default\""));
    }

    #[test]
    fn newer_config_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readaloud.toml");
        std::fs::write(&path, "config_version = \"99.0.0\"\n").unwrap();
        assert!(check_setup_needed(&path).unwrap().is_none());
    }
}

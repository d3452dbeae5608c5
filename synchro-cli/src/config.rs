//! Configuration loading for synchro.
//!
//! Configuration is loaded from a TOML file (default: `synchro.toml` in the
//! data directory). Every field has a default and a missing file means
//! defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use synchro_core::{ApplyOptions, MergeOptions, SynchroOptions};
use synchro_types::MASTER;

/// Root configuration for synchro.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Synchro configuration.
    #[serde(default)]
    pub synchro: SynchroConfig,
    /// Apply configuration.
    #[serde(default)]
    pub apply: ApplyConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Synchro configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SynchroConfig {
    /// Synchro name (default: all).
    #[serde(default = "default_name")]
    pub name: String,
    /// Branch used when a command gets no `--branch` (default: master).
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Root tree name of new histories (default: synchro).
    #[serde(default = "default_tree_name")]
    pub tree_name: String,
    /// Subject of snapshot commits.
    #[serde(default = "default_snapshot_subject")]
    pub snapshot_subject: String,
    /// Subject of merge commits.
    #[serde(default = "default_merge_subject")]
    pub merge_subject: String,
    /// Subject of virtual merge base commits.
    #[serde(default = "default_virtual_base_subject")]
    pub virtual_base_subject: String,
}

/// Apply configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyConfig {
    /// Leaf branch replayed onto the live collection (default: branches/master).
    #[serde(default = "default_apply_branch")]
    pub branch: String,
    /// Owner id stored for unknown usernames (default: unknown).
    #[serde(default = "default_unknown_owner")]
    pub unknown_owner: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Filter directive, used when `RUST_LOG` is unset (default: info).
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_name() -> String {
    "all".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_tree_name() -> String {
    "synchro".to_string()
}

fn default_snapshot_subject() -> String {
    "Snapshot".to_string()
}

fn default_merge_subject() -> String {
    "Merge".to_string()
}

fn default_virtual_base_subject() -> String {
    "Virtual merge base".to_string()
}

fn default_apply_branch() -> String {
    MASTER.to_string()
}

fn default_unknown_owner() -> String {
    "unknown".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SynchroConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            branch: default_branch(),
            tree_name: default_tree_name(),
            snapshot_subject: default_snapshot_subject(),
            merge_subject: default_merge_subject(),
            virtual_base_subject: default_virtual_base_subject(),
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            branch: default_apply_branch(),
            unknown_owner: default_unknown_owner(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load configuration, falling back to defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Engine options derived from this configuration.
    pub fn synchro_options(&self) -> SynchroOptions {
        SynchroOptions {
            name: self.synchro.name.clone(),
            snapshot_subject: self.synchro.snapshot_subject.clone(),
            merge: MergeOptions {
                subject: self.synchro.merge_subject.clone(),
                virtual_base_subject: self.synchro.virtual_base_subject.clone(),
                tree_name: self.synchro.tree_name.clone(),
            },
            apply: ApplyOptions {
                branch: self.apply.branch.clone(),
                unknown_owner: self.apply.unknown_owner.clone(),
            },
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_matches_engine_defaults() {
        let config = Config::default();
        assert_eq!(config.synchro.branch, "master");
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.synchro_options(), SynchroOptions::default());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[synchro]
name = "photos"
merge_subject = "Sync"

[apply]
unknown_owner = "nobody"

[log]
filter = "synchro_core=debug"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.synchro.name, "photos");
        assert_eq!(config.apply.unknown_owner, "nobody");
        assert_eq!(config.log.filter, "synchro_core=debug");

        let options = config.synchro_options();
        assert_eq!(options.merge.subject, "Sync");
        assert_eq!(options.merge.virtual_base_subject, "Virtual merge base");
        assert_eq!(options.apply.branch, MASTER);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.synchro.name, "all");
        assert_eq!(config.apply.unknown_owner, "unknown");
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("synchro.toml")).unwrap();
        assert_eq!(config.synchro.tree_name, "synchro");
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synchro.toml");
        std::fs::write(&path, "[synchro\nname = 1").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}

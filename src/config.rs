//! Configuration module for the tree watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TREEWATCH_` and use double
//! underscores to separate nested levels:
//! - `TREEWATCH_WATCHER__EVENT_BUFFER_SIZE=131072` sets `watcher.event_buffer_size`
//! - `TREEWATCH_WATCHER__RECURSIVE=false` sets `watcher.recursive`
//! - `TREEWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::watcher::{DEFAULT_EVENT_BUFFER_SIZE, MIN_EVENT_BUFFER_SIZE, WatchError};

const CONFIG_DIR: &str = ".treewatch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Sysctl file holding the per-user watch limit
    #[serde(default = "default_max_watches_path")]
    pub max_watches_path: PathBuf,

    /// Size in bytes of the buffer used for one kernel read
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Watch subdirectories of each root
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Paths recursive descent never enters
    #[serde(default)]
    pub mounts: Vec<PathBuf>,

    /// Filesystem types whose mount points are treated as boundaries
    #[serde(default = "default_unwatchable_fs_types")]
    pub unwatchable_fs_types: Vec<String>,

    /// Mount table consulted for `unwatchable_fs_types`
    #[serde(default = "default_mount_table")]
    pub mount_table: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level applied to every module without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `treewatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_watches_path() -> PathBuf {
    PathBuf::from("/proc/sys/fs/inotify/max_user_watches")
}
fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}
fn default_mount_table() -> PathBuf {
    PathBuf::from("/proc/self/mounts")
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_unwatchable_fs_types() -> Vec<String> {
    ["nfs", "nfs4", "cifs", "smb3", "smbfs", "fuse.sshfs", "9p", "proc", "sysfs"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_watches_path: default_max_watches_path(),
            event_buffer_size: default_event_buffer_size(),
            recursive: true,
            mounts: Vec::new(),
            unwatchable_fs_types: default_unwatchable_fs_types(),
            mount_table: default_mount_table(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels; single
            // underscores stay part of the field name
            .merge(Env::prefixed("TREEWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the nearest `.treewatch/settings.toml`, searching from the
    /// current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Reject settings the watcher cannot run with
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.watcher.event_buffer_size < MIN_EVENT_BUFFER_SIZE {
            return Err(WatchError::ConfigError {
                reason: format!(
                    "watcher.event_buffer_size must be at least {MIN_EVENT_BUFFER_SIZE} bytes, got {}",
                    self.watcher.event_buffer_size
                ),
            });
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `dir`
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

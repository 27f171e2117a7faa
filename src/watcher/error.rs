//! Error types for the tree watcher.
//!
//! Per-path registration problems are reported through [`Outcome`]; these
//! errors cover the watcher as a whole.
//!
//! [`Outcome`]: super::Outcome

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize inotify: {source}")]
    InitFailed {
        #[source]
        source: io::Error,
    },

    #[error("Too many inotify instances: {source}")]
    InstanceLimit {
        #[source]
        source: io::Error,
    },

    #[error("Cannot determine watch capacity from {}: {reason}", path.display())]
    CapacityProbe { path: PathBuf, reason: String },

    #[error("Failed to read inotify events: {source}")]
    ReadFailed {
        #[source]
        source: io::Error,
    },

    #[error(
        "Watching new directory {} failed; dropped the subtree at {}",
        path.display(),
        root.display()
    )]
    SubtreeAborted { path: PathBuf, root: PathBuf },

    #[error("Failed to load config: {reason}")]
    ConfigError { reason: String },
}

impl From<Box<figment::Error>> for WatchError {
    fn from(e: Box<figment::Error>) -> Self {
        WatchError::ConfigError {
            reason: e.to_string(),
        }
    }
}

//! Recursive directory change watching on top of inotify.
//!
//! Register a directory tree with [`TreeWatcher::watch`], then call
//! [`TreeWatcher::process_input`] whenever the inotify descriptor is
//! readable. Every change is reported to a [`WatchListener`] as an absolute
//! path plus the raw inotify mask, and the set of watched directories
//! follows the tree as it changes.

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatcherConfig};
pub use watcher::{
    MountPoints, Notice, Outcome, TreeWatcher, WatchError, WatchHandle, WatchListener,
};

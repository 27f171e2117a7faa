//! Recursive directory watcher on top of inotify.
//!
//! inotify only reports changes for directories it was told about, so this
//! module keeps a tree of watches mirroring the directory hierarchy: new
//! subdirectories are watched as they appear, deleted ones are pruned, and
//! hard-linked directories share one kernel watch with several paths.
//!
//! # Architecture
//!
//! ```text
//! TreeWatcher<B, L>
//!   - Backend (inotify fd)        raw events keyed by WatchHandle
//!   - WatchTable                  WatchHandle -> WatchNode (parent, children, aliases, scope)
//!   - WatchLimitMonitor           one-shot ENOSPC notice
//!   - WatchListener               (path, mask) callbacks
//!
//! watch()          -> walk_tree -> add_watch   (per directory)
//! process_input()  -> listener, walk_tree on create, prune on delete
//! ```

mod backend;
mod error;
mod limit;
mod listener;
pub mod mask;
mod mounts;
mod outcome;
mod table;
mod translator;
mod tree;
mod walker;

#[cfg(test)]
mod testing;

pub use backend::{
    Backend, DEFAULT_EVENT_BUFFER_SIZE, InotifyBackend, MIN_EVENT_BUFFER_SIZE, RawEvent,
    read_watch_capacity,
};
pub use error::WatchError;
pub use limit::WatchLimitMonitor;
pub use listener::{Notice, WatchListener};
pub use mounts::MountPoints;
pub use outcome::{Outcome, WatchHandle};
pub use table::{WatchNode, WatchScope, WatchTable};
pub use tree::TreeWatcher;
pub use walker::MAX_PATH_LEN;

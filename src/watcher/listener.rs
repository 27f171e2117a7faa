//! Interface to whatever consumes change events.

use std::fmt;
use std::path::Path;

/// Out-of-band conditions the user should hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The per-user inotify watch quota is exhausted; some directories are
    /// not being watched.
    WatchLimit,
    /// The per-user inotify instance quota is exhausted; nothing can be
    /// watched.
    InstanceLimit,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::WatchLimit => f.write_str(
                "inotify watch limit reached; raise fs.inotify.max_user_watches to watch everything",
            ),
            Notice::InstanceLimit => f.write_str(
                "inotify instance limit reached; raise fs.inotify.max_user_instances",
            ),
        }
    }
}

/// Receiver of path-level change events.
///
/// Called synchronously from inside the watcher. Implementations must not
/// call back into the watcher.
pub trait WatchListener {
    /// A change at `path`, once per alias of the affected directory.
    fn on_change(&mut self, path: &Path, mask: u32);

    /// A resource condition; each kind is delivered at most once.
    fn on_notice(&mut self, _notice: Notice) {}
}

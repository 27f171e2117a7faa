//! The watcher context: kernel channel, watch table and listener in one
//! explicitly created value.

use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::config::WatcherConfig;

use super::backend::{Backend, InotifyBackend, read_watch_capacity};
use super::error::WatchError;
use super::limit::WatchLimitMonitor;
use super::listener::{Notice, WatchListener};
use super::outcome::WatchHandle;
use super::table::WatchTable;

/// Recursive directory watcher.
///
/// Single-threaded and non-reentrant: every operation runs to completion on
/// the caller's thread, and the listener is invoked synchronously.
#[derive(Debug)]
pub struct TreeWatcher<B, L> {
    pub(super) backend: B,
    pub(super) listener: L,
    pub(super) table: WatchTable,
    pub(super) limit: WatchLimitMonitor,
}

impl<B: Backend, L: WatchListener> TreeWatcher<B, L> {
    /// Assemble a watcher from an already opened backend.
    pub fn new(backend: B, listener: L, capacity: usize) -> Self {
        Self {
            backend,
            listener,
            table: WatchTable::create(capacity),
            limit: WatchLimitMonitor::new(),
        }
    }

    pub fn table(&self) -> &WatchTable {
        &self.table
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Number of registered kernel watches.
    pub fn watch_count(&self) -> usize {
        self.table.len()
    }

    /// Whether the watch quota has been exhausted at least once.
    pub fn limit_reached(&self) -> bool {
        self.limit.is_reached()
    }

    /// Handle of the node watching `path`, if any.
    pub fn find(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
        self.table.find(path.as_ref()).map(|node| node.handle())
    }

    /// Tear the watcher down, returning the backend and listener.
    ///
    /// Dropping the backend closes the kernel descriptor, which releases
    /// every remaining kernel watch.
    pub fn close(mut self) -> (B, L) {
        tracing::debug!("[watcher] closing with {} watches", self.table.len());
        self.table.clear();
        (self.backend, self.listener)
    }

    pub(super) fn watch_limit_reached(&mut self) {
        if self.limit.trip() {
            self.listener.on_notice(Notice::WatchLimit);
        }
    }
}

impl<L: WatchListener> TreeWatcher<InotifyBackend, L> {
    /// Open inotify, probe the watch capacity and build an empty tree.
    pub fn init(config: &WatcherConfig, mut listener: L) -> Result<Self, WatchError> {
        let backend = match InotifyBackend::open(config.event_buffer_size) {
            Ok(backend) => backend,
            Err(source) if source.raw_os_error() == Some(libc::EMFILE) => {
                tracing::error!("[inotify] init failed: {source}");
                listener.on_notice(Notice::InstanceLimit);
                return Err(WatchError::InstanceLimit { source });
            }
            Err(source) => {
                tracing::error!("[inotify] init failed: {source}");
                return Err(WatchError::InitFailed { source });
            }
        };

        // Dropping the backend on error closes the instance.
        let capacity = read_watch_capacity(&config.max_watches_path).inspect_err(|e| {
            tracing::error!("[inotify] {e}");
        })?;
        tracing::info!("[inotify] watch descriptors: {capacity}");

        Ok(Self::new(backend, listener, capacity))
    }
}

impl<L> AsRawFd for TreeWatcher<InotifyBackend, L> {
    fn as_raw_fd(&self) -> RawFd {
        self.backend.as_raw_fd()
    }
}

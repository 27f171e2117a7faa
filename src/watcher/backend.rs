//! Kernel notification channel.
//!
//! [`Backend`] is the seam between the watch tree and the kernel. The
//! production implementation wraps an inotify instance; kernel errors keep
//! their raw `errno` so callers can classify them.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, ReadDir};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use inotify::{Inotify, WatchDescriptor, WatchMask};

use super::error::WatchError;
use super::outcome::WatchHandle;

/// Default read buffer: room for 2048 events with short names.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 2048 * (16 + 16);

/// Smallest buffer guaranteed to hold one event with a maximal name.
pub const MIN_EVENT_BUFFER_SIZE: usize = 4096;

/// One notification as read from the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub mask: u32,
    /// Entry name for events about a directory's children; `None` for
    /// events about the watched directory itself.
    pub name: Option<OsString>,
}

/// Kernel change-notification facility.
pub trait Backend {
    /// Subscribe `path` to [`WATCH_INTEREST`](super::mask::WATCH_INTEREST).
    ///
    /// Returns the existing handle when `path` resolves to an inode that is
    /// already watched.
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle>;

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// List a directory the walker is about to descend into.
    fn open_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        fs::read_dir(path)
    }

    /// Block until at least one event is queued, then drain what fits in
    /// one read.
    fn read_events(&mut self) -> io::Result<Vec<RawEvent>>;
}

/// inotify-backed [`Backend`].
#[derive(Debug)]
pub struct InotifyBackend {
    inotify: Inotify,
    /// Kernel descriptors by handle, needed to unsubscribe.
    descriptors: HashMap<WatchHandle, WatchDescriptor>,
    buffer: Vec<u8>,
}

impl InotifyBackend {
    /// Open a new inotify instance.
    pub fn open(buffer_size: usize) -> io::Result<Self> {
        let inotify = Inotify::init()?;
        tracing::debug!("[inotify] fd: {}", inotify.as_raw_fd());
        Ok(Self {
            inotify,
            descriptors: HashMap::new(),
            buffer: vec![0; buffer_size.max(MIN_EVENT_BUFFER_SIZE)],
        })
    }

    fn interest() -> WatchMask {
        WatchMask::MODIFY
            | WatchMask::ATTRIB
            | WatchMask::CREATE
            | WatchMask::DELETE
            | WatchMask::MOVE
            | WatchMask::DELETE_SELF
            | WatchMask::MOVE_SELF
    }
}

impl Backend for InotifyBackend {
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle> {
        let wd = self.inotify.watches().add(path, Self::interest())?;
        let handle = WatchHandle::new(wd.get_watch_descriptor_id());
        self.descriptors.insert(handle, wd);
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        match self.descriptors.remove(&handle) {
            Some(wd) => self.inotify.watches().remove(wd),
            None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
        let events = self.inotify.read_events_blocking(&mut self.buffer)?;
        let mut batch = Vec::new();
        for event in events {
            let handle = WatchHandle::new(event.wd.get_watch_descriptor_id());
            let mask = event.mask.bits();
            if mask & super::mask::IGNORED != 0 {
                // The kernel already dropped this watch.
                self.descriptors.remove(&handle);
            }
            batch.push(RawEvent {
                handle,
                mask,
                name: event.name.map(OsStr::to_os_string),
            });
        }
        Ok(batch)
    }
}

impl AsRawFd for InotifyBackend {
    fn as_raw_fd(&self) -> RawFd {
        self.inotify.as_raw_fd()
    }
}

/// Read the maximum number of watches from a sysctl file such as
/// `/proc/sys/fs/inotify/max_user_watches`.
pub fn read_watch_capacity(path: &Path) -> Result<usize, WatchError> {
    let probe_error = |reason: String| WatchError::CapacityProbe {
        path: path.to_path_buf(),
        reason,
    };

    let contents = fs::read_to_string(path).map_err(|e| probe_error(e.to_string()))?;
    let line = contents.lines().next().unwrap_or("").trim();
    let value: i64 = line
        .parse()
        .map_err(|_| probe_error(format!("not a number: {line:?}")))?;
    if value <= 0 {
        return Err(probe_error(format!("non-positive value {value}")));
    }
    usize::try_from(value).map_err(|e| probe_error(e.to_string()))
}

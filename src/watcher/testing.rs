//! In-memory kernel stand-in for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};

use super::backend::{Backend, RawEvent};
use super::listener::{Notice, WatchListener};
use super::outcome::WatchHandle;

/// Hands out handles per path, like inotify does per inode.
///
/// Hard links are simulated with [`FakeBackend::link`]: the linked path
/// gets the handle of its target.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    next: i32,
    handles: HashMap<PathBuf, WatchHandle>,
    links: HashMap<PathBuf, PathBuf>,
    failures: HashMap<PathBuf, i32>,
    listing_failures: HashMap<PathBuf, i32>,
    pub active: HashSet<WatchHandle>,
    pub removed: Vec<WatchHandle>,
    batches: VecDeque<io::Result<Vec<RawEvent>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next: 1,
            ..Self::default()
        }
    }

    /// Make `path` resolve to the same handle as `target`.
    pub fn link(&mut self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.links.insert(path.into(), target.into());
    }

    /// Fail registrations of `path` with `errno`.
    pub fn fail(&mut self, path: impl Into<PathBuf>, errno: i32) {
        self.failures.insert(path.into(), errno);
    }

    /// Fail directory listings of `path` with `errno`.
    pub fn fail_listing(&mut self, path: impl Into<PathBuf>, errno: i32) {
        self.listing_failures.insert(path.into(), errno);
    }

    pub fn push_batch(&mut self, events: Vec<RawEvent>) {
        self.batches.push_back(Ok(events));
    }

    pub fn push_read_error(&mut self, errno: i32) {
        self.batches
            .push_back(Err(io::Error::from_raw_os_error(errno)));
    }
}

impl Backend for FakeBackend {
    fn add_watch(&mut self, path: &Path) -> io::Result<WatchHandle> {
        if let Some(errno) = self.failures.get(path) {
            return Err(io::Error::from_raw_os_error(*errno));
        }
        let key = self.links.get(path).cloned().unwrap_or_else(|| path.to_path_buf());
        if let Some(handle) = self.handles.get(&key) {
            if self.active.contains(handle) {
                return Ok(*handle);
            }
        }
        let handle = WatchHandle::new(self.next);
        self.next += 1;
        self.handles.insert(key, handle);
        self.active.insert(handle);
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        if !self.active.remove(&handle) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.removed.push(handle);
        Ok(())
    }

    fn open_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        match self.listing_failures.get(path) {
            Some(errno) => Err(io::Error::from_raw_os_error(*errno)),
            None => fs::read_dir(path),
        }
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
        self.batches
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::from_raw_os_error(libc::EAGAIN)))
    }
}

pub(crate) fn event(handle: WatchHandle, mask: u32, name: Option<&str>) -> RawEvent {
    RawEvent {
        handle,
        mask,
        name: name.map(OsString::from),
    }
}

/// Listener that records everything it is told.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub changes: Vec<(PathBuf, u32)>,
    pub notices: Vec<Notice>,
}

impl Recorder {
    pub fn paths(&self) -> Vec<&Path> {
        self.changes.iter().map(|(path, _)| path.as_path()).collect()
    }
}

impl WatchListener for Recorder {
    fn on_change(&mut self, path: &Path, mask: u32) {
        self.changes.push((path.to_path_buf(), mask));
    }

    fn on_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

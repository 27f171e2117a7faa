//! Building and tearing down watch trees.

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::Backend;
use super::listener::WatchListener;
use super::mounts::MountPoints;
use super::outcome::{Outcome, WatchHandle};
use super::table::{WatchNode, WatchScope};
use super::tree::TreeWatcher;

/// Longest path the watcher handles: twice `PATH_MAX`.
pub const MAX_PATH_LEN: usize = 2 * libc::PATH_MAX as usize;

pub(super) fn within_path_limit(path: &Path) -> bool {
    path.as_os_str().len() <= MAX_PATH_LEN
}

/// Drop a single trailing separator, keeping `/` itself intact.
fn strip_trailing_separator(path: &Path) -> PathBuf {
    match path.as_os_str().as_bytes() {
        [rest @ .., b'/'] if !rest.is_empty() => PathBuf::from(OsStr::from_bytes(rest)),
        _ => path.to_path_buf(),
    }
}

impl<B: Backend, L: WatchListener> TreeWatcher<B, L> {
    /// Register `root` and, when `recursive`, every directory beneath it
    /// that is not behind one of `mounts`.
    ///
    /// A plain-file root is always watched non-recursively. A relative root is resolved against the current directory, so
    /// reported paths and mount checks are always absolute.
    pub fn watch(&mut self, root: impl AsRef<Path>, recursive: bool, mounts: &MountPoints) -> Outcome {
        let root = match std::path::absolute(root.as_ref()) {
            Ok(root) => strip_trailing_separator(&root),
            Err(e) => {
                tracing::info!("[walker] cannot resolve {}: {e}", root.as_ref().display());
                return Outcome::Continue;
            }
        };
        if !within_path_limit(&root) {
            tracing::info!("[walker] root path too long: {} bytes", root.as_os_str().len());
            return Outcome::Continue;
        }

        let metadata = match fs::metadata(&root) {
            Ok(metadata) => metadata,
            Err(e) => {
                return match e.raw_os_error() {
                    Some(libc::ENOENT) => Outcome::Missing,
                    Some(libc::EACCES | libc::ELOOP | libc::ENAMETOOLONG | libc::ENOTDIR) => {
                        tracing::info!("[walker] stat({}): {e}", root.display());
                        Outcome::Continue
                    }
                    _ => {
                        tracing::error!("[walker] stat({}): {e}", root.display());
                        Outcome::Abort
                    }
                };
            }
        };

        let file_type = metadata.file_type();
        let recursive = if file_type.is_file() {
            false
        } else if file_type.is_dir() {
            recursive
        } else {
            tracing::warn!("[walker] unexpected node type: {} {file_type:?}", root.display());
            return Outcome::Ignore;
        };

        let scope = Arc::new(WatchScope::new(mounts.clone(), recursive));
        self.walk_tree(&root, None, &scope)
    }

    /// Remove a watch tree by its root handle. Unknown handles are ignored.
    pub fn unwatch(&mut self, handle: WatchHandle) {
        self.remove_node(handle, true);
    }

    /// Watch `path` under `parent`, descending into subdirectories when
    /// the scope is recursive.
    ///
    /// A fatal outcome anywhere below unwinds everything registered for
    /// `path` before it is returned.
    pub(super) fn walk_tree(
        &mut self,
        path: &Path,
        parent: Option<WatchHandle>,
        scope: &Arc<WatchScope>,
    ) -> Outcome {
        let recursive = scope.recursive;
        if recursive {
            if let Some(mount) = scope.mounts.boundary_for(path) {
                tracing::debug!(
                    "[walker] watch path '{}' crossed mount point '{}' - skipping",
                    path.display(),
                    mount.display()
                );
                return Outcome::Ignore;
            }
        }

        let entries = if recursive {
            match self.backend.open_dir(path) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    return match e.raw_os_error() {
                        Some(libc::EACCES | libc::ENOENT | libc::ENOTDIR) => {
                            tracing::debug!("[walker] opendir({}): {e}", path.display());
                            Outcome::Ignore
                        }
                        _ => {
                            tracing::error!("[walker] opendir({}): {e}", path.display());
                            Outcome::Continue
                        }
                    };
                }
            }
        } else {
            None
        };

        let outcome = self.add_watch(path, parent, scope);
        let Some(entries) = entries else {
            return outcome;
        };
        let Outcome::Handle(handle) = outcome else {
            return outcome;
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("[walker] readdir({}): {e}", path.display());
                    continue;
                }
            };

            // Uses the dirent type when the filesystem provides one and
            // falls back to a stat call otherwise.
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("[walker] stat({}): {e}", entry.path().display());
                    continue;
                }
            }

            let child = entry.path();
            if !within_path_limit(&child) {
                tracing::debug!("[walker] path too long, skipping: {}", child.display());
                continue;
            }

            let result = self.walk_tree(&child, Some(handle), scope);
            if result.is_fatal() {
                self.remove_node(handle, true);
                return result;
            }
        }

        Outcome::Handle(handle)
    }

    /// Register a single watch for `path` and link it under `parent`.
    pub(super) fn add_watch(
        &mut self,
        path: &Path,
        parent: Option<WatchHandle>,
        scope: &Arc<WatchScope>,
    ) -> Outcome {
        let handle = match self.backend.add_watch(path) {
            Ok(handle) => handle,
            Err(e) => {
                return match e.raw_os_error() {
                    Some(libc::EACCES | libc::ENOENT) => {
                        tracing::debug!("[walker] inotify_add_watch({}): {e}", path.display());
                        Outcome::Ignore
                    }
                    Some(libc::ENOSPC) => {
                        tracing::warn!("[walker] inotify_add_watch({}): {e}", path.display());
                        self.watch_limit_reached();
                        Outcome::Continue
                    }
                    _ => {
                        tracing::error!("[walker] inotify_add_watch({}): {e}", path.display());
                        Outcome::Abort
                    }
                };
            }
        };
        tracing::debug!("[walker] watching {}: {handle}", path.display());

        if let Some(node) = self.table.get(handle) {
            if node.handle() != handle {
                tracing::error!(
                    "[walker] table error: corruption at {handle}:{} / {}:{}",
                    path.display(),
                    node.handle(),
                    node.primary_path().display()
                );
                return Outcome::Abort;
            }
            return self.add_alias(handle, path);
        }

        if let Some(parent) = parent.and_then(|p| self.table.get_mut(p)) {
            parent.attach_child(handle);
        }
        self.table
            .put(handle, WatchNode::new(handle, path.to_path_buf(), parent, Arc::clone(scope)));
        Outcome::Handle(handle)
    }

    /// A second path resolved to an already watched handle: either the same
    /// directory reached again, or a distinct hard link to it.
    fn add_alias(&mut self, handle: WatchHandle, path: &Path) -> Outcome {
        let Some(node) = self.table.get(handle) else {
            return Outcome::Abort;
        };

        let real = fs::canonicalize(path);
        for alias in node.aliases() {
            let (Ok(real), Ok(existing)) = (&real, fs::canonicalize(alias)) else {
                tracing::error!(
                    "[walker] table error: unable to determine real path of either directory {}, {}",
                    path.display(),
                    node.primary_path().display()
                );
                return Outcome::Abort;
            };
            if *real == existing {
                tracing::info!(
                    "[walker] intersection at {handle}: (new {}, existing {}, real {})",
                    path.display(),
                    node.primary_path().display(),
                    existing.display()
                );
                return Outcome::Ignore;
            }
        }

        tracing::info!(
            "[walker] shared inode at {handle}: (new {}, existing {})",
            path.display(),
            node.primary_path().display()
        );
        if let Some(node) = self.table.get_mut(handle) {
            node.push_alias(path.to_path_buf());
        }
        Outcome::Handle(handle)
    }

    /// Unregister `handle` and everything beneath it.
    ///
    /// With `update_parent`, the parent's slot for this node is tombstoned.
    pub(super) fn remove_node(&mut self, handle: WatchHandle, update_parent: bool) {
        let Some(node) = self.table.remove(handle) else {
            return;
        };
        tracing::debug!("[walker] unwatching {}: {handle}", node.primary_path().display());

        if let Err(e) = self.backend.remove_watch(handle) {
            tracing::debug!(
                "[walker] inotify_rm_watch({handle}:{}): {e}",
                node.primary_path().display()
            );
        }

        for child in node.children() {
            self.remove_node(child, false);
        }

        if update_parent {
            if let Some(parent) = node.parent().and_then(|p| self.table.get_mut(p)) {
                parent.detach_child(handle);
            }
        }
    }

    /// Forget every alias of `handle` and its descendants at or beneath
    /// `prefix`. Nodes left without an alias are removed.
    pub(super) fn drop_aliases(&mut self, handle: WatchHandle, prefix: &Path) {
        let Some(node) = self.table.get_mut(handle) else {
            return;
        };
        if !node.aliases().iter().any(|alias| alias.starts_with(prefix)) {
            return;
        }
        if !node.drop_aliases_under(prefix) {
            self.remove_node(handle, true);
            return;
        }
        tracing::info!(
            "[walker] dropped alias {} of {handle}, keeping {}",
            prefix.display(),
            node.primary_path().display()
        );

        let children: Vec<WatchHandle> = node.children().collect();
        for child in children {
            self.drop_aliases(child, prefix);
        }
    }
}

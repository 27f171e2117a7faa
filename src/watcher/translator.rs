//! Turning raw kernel events into path-level changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::{Backend, RawEvent};
use super::error::WatchError;
use super::listener::WatchListener;
use super::mask;
use super::outcome::WatchHandle;
use super::tree::TreeWatcher;
use super::walker::within_path_limit;

impl<B: Backend, L: WatchListener> TreeWatcher<B, L> {
    /// Read one batch of kernel events and dispatch it.
    ///
    /// Blocks until the kernel has at least one event queued. New
    /// directories are watched and deleted ones pruned as the batch is
    /// processed. An error means the watcher can no longer be trusted to
    /// mirror the directory tree.
    pub fn process_input(&mut self) -> Result<(), WatchError> {
        let events = self.backend.read_events().map_err(|source| {
            tracing::error!("[translator] read: {source}");
            WatchError::ReadFailed { source }
        })?;

        for event in &events {
            if event.mask & mask::IGNORED != 0 {
                continue;
            }
            if event.mask & mask::Q_OVERFLOW != 0 {
                tracing::info!("[translator] event queue overflow");
                continue;
            }
            self.process_event(event)?;
        }

        Ok(())
    }

    fn process_event(&mut self, event: &RawEvent) -> Result<(), WatchError> {
        let Some(node) = self.table.get(event.handle) else {
            return Ok(());
        };

        let is_dir = mask::is_dir(event.mask);
        tracing::debug!(
            "[translator] wd={} mask={} dir={is_dir} name={}",
            event.handle,
            mask::describe(event.mask & !mask::ISDIR),
            node.primary_path().display()
        );

        let aliases = node.aliases().to_vec();
        for alias in aliases {
            let path = match &event.name {
                Some(name) => alias.join(name),
                None => alias,
            };
            if !within_path_limit(&path) {
                tracing::warn!("[translator] path too long, dropping event: {}", path.display());
                continue;
            }

            self.listener.on_change(&path, event.mask);

            if is_dir && event.mask & mask::ENTRY_ADDED != 0 {
                self.watch_new_directory(event.handle, &path)?;
            }

            if is_dir && event.mask & mask::ENTRY_REMOVED != 0 {
                self.prune_child(event.handle, &path);
            }
        }

        Ok(())
    }

    fn watch_new_directory(&mut self, handle: WatchHandle, path: &Path) -> Result<(), WatchError> {
        let Some(scope) = self.table.get(handle).map(|node| Arc::clone(node.scope())) else {
            return Ok(());
        };
        if !scope.recursive {
            tracing::debug!("[translator] not descending into {}: flat watch", path.display());
            return Ok(());
        }
        let result = self.walk_tree(path, Some(handle), &scope);
        if !result.is_fatal() {
            return Ok(());
        }

        let root = self
            .table
            .get(handle)
            .map(|node| node.primary_path().to_path_buf())
            .unwrap_or_else(PathBuf::new);
        tracing::error!(
            "[translator] watching {} failed ({result}); dropping {}",
            path.display(),
            root.display()
        );
        self.remove_node(handle, true);
        Err(WatchError::SubtreeAborted {
            path: path.to_path_buf(),
            root,
        })
    }

    /// Stop watching the child of `parent` that `path` refers to.
    fn prune_child(&mut self, parent: WatchHandle, path: &Path) {
        let Some(node) = self.table.get(parent) else {
            return;
        };
        let matched = node.children().find_map(|child| {
            let kid = self.table.get(child)?;
            kid.aliases()
                .iter()
                .find(|alias| path.starts_with(alias))
                .map(|alias| (child, alias.clone()))
        });
        // A hard-linked directory hangs under the parent it was first
        // reached through, so other aliases are looked up by path.
        let matched = matched.or_else(|| {
            self.table
                .find(path)
                .map(|node| (node.handle(), path.to_path_buf()))
        });
        let Some((child, alias)) = matched else {
            return;
        };

        // A node reached through several hard links only loses the alias
        // that went away; it is removed with its last alias.
        self.drop_aliases(child, &alias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::MountPoints;
    use crate::watcher::testing::{FakeBackend, Recorder, event};
    use std::fs;
    use tempfile::TempDir;

    fn watched(root: &Path, mounts: &MountPoints) -> (TreeWatcher<FakeBackend, Recorder>, WatchHandle) {
        let mut w = TreeWatcher::new(FakeBackend::new(), Recorder::default(), 64);
        let handle = w.watch(root, true, mounts).handle().expect("root watched");
        (w, handle)
    }

    #[test]
    fn test_new_subdirectory_is_watched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        w.backend
            .push_batch(vec![event(root_handle, mask::CREATE | mask::ISDIR, Some("sub"))]);
        w.process_input().unwrap();

        let sub = w.find(root.join("sub")).expect("new directory watched");
        assert!(w.find(root.join("sub/deeper")).is_some());
        assert_eq!(w.table().get(sub).unwrap().parent(), Some(root_handle));

        fs::write(root.join("sub/file.txt"), "x").unwrap();
        w.backend
            .push_batch(vec![event(sub, mask::CREATE, Some("file.txt"))]);
        w.process_input().unwrap();

        assert_eq!(
            w.listener().paths(),
            vec![root.join("sub").as_path(), root.join("sub/file.txt").as_path()]
        );
        assert_eq!(w.listener().changes[1].1, mask::CREATE);
    }

    #[test]
    fn test_deleted_subdirectory_is_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("gone/inner")).unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        let gone = w.find(root.join("gone")).unwrap();
        let inner = w.find(root.join("gone/inner")).unwrap();
        let kept = w.find(root.join("kept")).unwrap();

        fs::remove_dir_all(root.join("gone")).unwrap();
        w.backend
            .push_batch(vec![event(root_handle, mask::DELETE | mask::ISDIR, Some("gone"))]);
        w.process_input().unwrap();

        assert!(!w.table().contains(gone));
        assert!(!w.table().contains(inner));
        assert!(w.table().contains(kept));
        assert_eq!(w.watch_count(), 2);

        let mut removed = w.backend().removed.clone();
        removed.sort();
        let mut expected = vec![gone, inner];
        expected.sort();
        assert_eq!(removed, expected);

        let root_node = w.table().get(root_handle).unwrap();
        assert_eq!(root_node.children().collect::<Vec<_>>(), vec![kept]);
    }

    #[test]
    fn test_moved_out_subdirectory_is_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("moving")).unwrap();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        w.backend.push_batch(vec![event(
            root_handle,
            mask::MOVED_FROM | mask::ISDIR,
            Some("moving"),
        )]);
        w.process_input().unwrap();

        assert!(w.find(root.join("moving")).is_none());
        assert_eq!(w.watch_count(), 1);
    }

    #[test]
    fn test_prune_does_not_match_sibling_with_common_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("foo")).unwrap();
        fs::create_dir_all(root.join("foobar")).unwrap();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        w.backend.push_batch(vec![event(
            root_handle,
            mask::DELETE | mask::ISDIR,
            Some("foobar"),
        )]);
        w.process_input().unwrap();

        assert!(w.find(root.join("foo")).is_some());
        assert!(w.find(root.join("foobar")).is_none());
    }

    #[test]
    fn test_file_deletion_does_not_prune() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("dir")).unwrap();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        w.backend
            .push_batch(vec![event(root_handle, mask::DELETE, Some("dir"))]);
        w.process_input().unwrap();

        assert!(w.find(root.join("dir")).is_some());
        assert_eq!(w.listener().changes.len(), 1);
    }

    #[test]
    fn test_ignored_overflow_and_unknown_events_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let (mut w, root_handle) = watched(temp_dir.path(), &MountPoints::default());

        w.backend.push_batch(vec![
            event(root_handle, mask::IGNORED, None),
            event(WatchHandle::new(-1), mask::Q_OVERFLOW, None),
            event(WatchHandle::new(4242), mask::MODIFY, Some("ghost")),
            event(root_handle, mask::DELETE_SELF, None),
        ]);
        w.process_input().unwrap();

        assert_eq!(w.listener().paths(), vec![temp_dir.path()]);
        assert_eq!(w.listener().changes[0].1, mask::DELETE_SELF);
    }

    #[test]
    fn test_callback_fires_once_per_alias() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();

        let mut w = TreeWatcher::new(FakeBackend::new(), Recorder::default(), 64);
        w.backend.link(root.join("b"), root.join("a"));
        w.watch(root, true, &MountPoints::default());
        let shared = w.find(root.join("a")).unwrap();

        w.backend
            .push_batch(vec![event(shared, mask::MODIFY, Some("f.txt"))]);
        w.process_input().unwrap();

        let mut paths: Vec<PathBuf> = w
            .listener()
            .changes
            .iter()
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        assert_eq!(paths, vec![root.join("a/f.txt"), root.join("b/f.txt")]);
    }

    #[test]
    fn test_deleting_one_hard_link_keeps_the_other() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/dir")).unwrap();
        fs::create_dir_all(root.join("b/dir")).unwrap();

        let mut w = TreeWatcher::new(FakeBackend::new(), Recorder::default(), 64);
        w.backend.link(root.join("b/dir"), root.join("a/dir"));
        w.watch(root, true, &MountPoints::default());

        let shared = w.find(root.join("a/dir")).unwrap();
        let b = w.find(root.join("b")).unwrap();
        let a = w.find(root.join("a")).unwrap();
        assert_eq!(w.table().get(shared).unwrap().aliases().len(), 2);

        w.backend
            .push_batch(vec![event(b, mask::DELETE | mask::ISDIR, Some("dir"))]);
        w.process_input().unwrap();

        let node = w.table().get(shared).expect("still reachable through a");
        assert_eq!(node.aliases(), &[root.join("a/dir")]);
        assert!(w.find(root.join("b/dir")).is_none());

        w.backend
            .push_batch(vec![event(a, mask::DELETE | mask::ISDIR, Some("dir"))]);
        w.process_input().unwrap();

        assert!(!w.table().contains(shared));
        assert_eq!(w.watch_count(), 3);
    }

    #[test]
    fn test_new_directory_behind_mount_is_not_watched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let mounts = MountPoints::new([root.join("mnt")]);
        let (mut w, root_handle) = watched(root, &mounts);

        fs::create_dir_all(root.join("mnt")).unwrap();
        w.backend
            .push_batch(vec![event(root_handle, mask::CREATE | mask::ISDIR, Some("mnt"))]);
        w.process_input().unwrap();

        assert!(w.find(root.join("mnt")).is_none());
        assert_eq!(w.listener().changes.len(), 1);
    }

    #[test]
    fn test_mount_boundary_stays_with_its_root() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let mut w = TreeWatcher::new(FakeBackend::new(), Recorder::default(), 64);
        let a_handle = w
            .watch(&a, true, &MountPoints::new([a.join("mnt")]))
            .handle()
            .unwrap();
        let b_handle = w.watch(&b, true, &MountPoints::default()).handle().unwrap();

        fs::create_dir_all(a.join("mnt/inner")).unwrap();
        fs::create_dir_all(b.join("mnt/inner")).unwrap();
        w.backend.push_batch(vec![
            event(a_handle, mask::CREATE | mask::ISDIR, Some("mnt")),
            event(b_handle, mask::CREATE | mask::ISDIR, Some("mnt")),
        ]);
        w.process_input().unwrap();

        assert!(w.find(a.join("mnt")).is_none());
        assert!(w.find(a.join("mnt/inner")).is_none());
        assert!(w.find(b.join("mnt")).is_some());
        assert!(w.find(b.join("mnt/inner")).is_some());
        assert_eq!(w.listener().changes.len(), 2);
    }

    #[test]
    fn test_flat_root_does_not_pick_up_new_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let mut w = TreeWatcher::new(FakeBackend::new(), Recorder::default(), 64);
        let root_handle = w.watch(root, false, &MountPoints::default()).handle().unwrap();

        fs::create_dir_all(root.join("sub/deep")).unwrap();
        w.backend
            .push_batch(vec![event(root_handle, mask::CREATE | mask::ISDIR, Some("sub"))]);
        w.process_input().unwrap();

        assert_eq!(w.listener().paths(), vec![root.join("sub").as_path()]);
        assert_eq!(w.watch_count(), 1);
        assert!(w.find(root.join("sub")).is_none());
    }

    #[test]
    fn test_failed_walk_drops_subtree_and_rest_of_batch() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let (mut w, root_handle) = watched(root, &MountPoints::default());

        fs::create_dir_all(root.join("broken")).unwrap();
        w.backend.fail(root.join("broken"), libc::EINVAL);
        w.backend.push_batch(vec![
            event(root_handle, mask::CREATE | mask::ISDIR, Some("broken")),
            event(root_handle, mask::MODIFY, Some("later.txt")),
        ]);

        let err = w.process_input().unwrap_err();
        assert!(matches!(err, WatchError::SubtreeAborted { ref path, .. } if path == &root.join("broken")));
        assert!(w.table().is_empty());
        assert_eq!(w.listener().changes.len(), 1);
    }

    #[test]
    fn test_read_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let (mut w, _) = watched(temp_dir.path(), &MountPoints::default());

        w.backend.push_read_error(libc::EBADF);

        let err = w.process_input().unwrap_err();
        assert!(matches!(err, WatchError::ReadFailed { .. }));
        assert_eq!(w.watch_count(), 1);
    }
}

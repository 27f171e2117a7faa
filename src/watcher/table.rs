//! Watch table: the single owner of every watch node.
//!
//! Nodes reference their parent and children by handle, so the tree has no
//! ownership cycle of its own. Removed children leave a tombstone in their
//! parent's child list instead of shifting the remaining entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::mounts::MountPoints;
use super::outcome::WatchHandle;

/// Upper bound on the number of slots allocated up front.
///
/// The kernel-reported capacity is often in the hundreds of thousands and is
/// only advisory, so it never dictates the initial allocation.
const PRESIZE_LIMIT: usize = 4096;

/// How a root was registered. Shared by every node of its tree, so
/// directories picked up later are walked the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchScope {
    pub mounts: MountPoints,
    pub recursive: bool,
}

impl WatchScope {
    pub fn new(mounts: MountPoints, recursive: bool) -> Self {
        Self { mounts, recursive }
    }
}

/// One watched directory (or file root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNode {
    handle: WatchHandle,
    parent: Option<WatchHandle>,
    scope: Arc<WatchScope>,
    /// Child slots; `None` marks a removed child.
    children: Vec<Option<WatchHandle>>,
    /// Never empty. The first entry is the primary path.
    aliases: Vec<PathBuf>,
}

impl WatchNode {
    /// Create a node with a single alias.
    pub fn new(
        handle: WatchHandle,
        path: PathBuf,
        parent: Option<WatchHandle>,
        scope: Arc<WatchScope>,
    ) -> Self {
        Self {
            handle,
            parent,
            scope,
            children: Vec::new(),
            aliases: vec![path],
        }
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle
    }

    pub fn parent(&self) -> Option<WatchHandle> {
        self.parent
    }

    /// Scope of the root this node was first reached from.
    pub fn scope(&self) -> &Arc<WatchScope> {
        &self.scope
    }

    /// Path used for diagnostics.
    pub fn primary_path(&self) -> &Path {
        &self.aliases[0]
    }

    /// Every path this node is reachable under.
    pub fn aliases(&self) -> &[PathBuf] {
        &self.aliases
    }

    /// Live children, skipping tombstones.
    pub fn children(&self) -> impl Iterator<Item = WatchHandle> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Number of child slots, tombstones included.
    pub fn child_slots(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn attach_child(&mut self, child: WatchHandle) {
        self.children.push(Some(child));
    }

    /// Tombstone the slot holding `child`. Returns whether it was found.
    pub(crate) fn detach_child(&mut self, child: WatchHandle) -> bool {
        match self.children.iter_mut().find(|slot| **slot == Some(child)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    pub(crate) fn push_alias(&mut self, path: PathBuf) {
        self.aliases.push(path);
    }

    /// Drop every alias at or beneath `prefix`.
    ///
    /// Returns `false`, leaving the aliases untouched, when nothing would
    /// remain; the caller removes the node instead.
    pub(crate) fn drop_aliases_under(&mut self, prefix: &Path) -> bool {
        if self.aliases.iter().all(|alias| alias.starts_with(prefix)) {
            return false;
        }
        self.aliases.retain(|alias| !alias.starts_with(prefix));
        true
    }
}

/// Mapping from kernel handle to node.
#[derive(Debug)]
pub struct WatchTable {
    nodes: HashMap<WatchHandle, WatchNode>,
    capacity: usize,
}

impl WatchTable {
    /// Create a table for an OS-reported watch capacity.
    ///
    /// Exceeding the capacity is not rejected here; the kernel refuses
    /// further registrations on its own.
    pub fn create(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity.min(PRESIZE_LIMIT)),
            capacity,
        }
    }

    pub fn get(&self, handle: WatchHandle) -> Option<&WatchNode> {
        self.nodes.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: WatchHandle) -> Option<&mut WatchNode> {
        self.nodes.get_mut(&handle)
    }

    /// Insert `node` under `handle`, returning any node it replaced.
    pub(crate) fn put(&mut self, handle: WatchHandle, node: WatchNode) -> Option<WatchNode> {
        self.nodes.insert(handle, node)
    }

    pub(crate) fn remove(&mut self, handle: WatchHandle) -> Option<WatchNode> {
        self.nodes.remove(&handle)
    }

    pub fn contains(&self, handle: WatchHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Capacity reported by the OS at initialization.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handles(&self) -> impl Iterator<Item = WatchHandle> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WatchNode> {
        self.nodes.values()
    }

    /// Node holding `path` as one of its aliases.
    pub fn find(&self, path: &Path) -> Option<&WatchNode> {
        self.nodes
            .values()
            .find(|node| node.aliases.iter().any(|alias| alias == path))
    }

    /// Number of ancestors of `handle`; roots have depth 0.
    pub fn depth(&self, handle: WatchHandle) -> Option<usize> {
        let mut node = self.nodes.get(&handle)?;
        let mut depth = 0;
        while let Some(parent) = node.parent.and_then(|p| self.nodes.get(&p)) {
            depth += 1;
            node = parent;
            if depth > self.nodes.len() {
                // A parent chain longer than the table means a cycle.
                return None;
            }
        }
        Some(depth)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}

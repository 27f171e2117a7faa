//! Watch handles and the outcome taxonomy shared by every tree mutation.

use std::fmt;

/// Kernel-issued identifier for one directory's change subscription.
///
/// Not sequential and not unique over time: the kernel hands out the same
/// handle again when a second path resolves to an already watched inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw kernel descriptor value.
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of registering (part of) a watch tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The path is watched under this handle.
    Handle(WatchHandle),
    /// Benign no-op: the path vanished, is not accessible, is already
    /// watched, or lies behind a mount boundary.
    Ignore,
    /// This subtree was skipped; sibling work proceeds.
    Continue,
    /// Unrecoverable; the whole request must fail.
    Abort,
    /// The registration root does not exist.
    Missing,
}

impl Outcome {
    /// The registered handle, if any.
    pub fn handle(self) -> Option<WatchHandle> {
        match self {
            Outcome::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Whether a walker must unwind the subtree it is building.
    pub fn is_fatal(self) -> bool {
        matches!(self, Outcome::Abort | Outcome::Missing)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Handle(handle) => write!(f, "watching (handle {handle})"),
            Outcome::Ignore => f.write_str("ignored"),
            Outcome::Continue => f.write_str("skipped"),
            Outcome::Abort => f.write_str("aborted"),
            Outcome::Missing => f.write_str("missing"),
        }
    }
}

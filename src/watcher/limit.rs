//! One-shot signal for watch quota exhaustion.

/// Remembers whether the watch limit has been hit.
///
/// Only the first exhaustion is worth telling the user about; every later
/// `ENOSPC` is the same condition.
#[derive(Debug, Default)]
pub struct WatchLimitMonitor {
    reached: bool,
}

impl WatchLimitMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exhaustion. Returns `true` only the first time.
    pub fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.reached, true)
    }

    pub fn is_reached(&self) -> bool {
        self.reached
    }
}

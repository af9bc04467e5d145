//! Opaque watch handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one watch for its whole lifetime.
///
/// Handles are never reused within a process, so a stale handle held by a
/// caller can never address a newer watch.
///
/// # Examples
///
/// ```
/// use fw_core::WatchId;
///
/// let a = WatchId::next();
/// let b = WatchId::next();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(u64);

impl WatchId {
    /// Allocates a fresh, process-unique handle.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_ids_increase() {
        let first = WatchId::next();
        let second = WatchId::next();
        assert!(second > first);
    }

    #[test]
    fn test_watch_id_display() {
        let id = WatchId(7);
        assert_eq!(id.to_string(), "#7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }
}

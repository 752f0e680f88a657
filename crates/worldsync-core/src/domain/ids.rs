//! The two-sided identifier space.
//!
//! Every mirrored object carries two identifiers from disjoint spaces:
//!
//! - a **local id**, assigned by [`IdCounter`] at creation time, before any
//!   network exchange; never zero, never reused;
//! - a **server id**, assigned by the remote simulation host and learned
//!   only via a creation-reply message. Zero is reserved to mean "not yet
//!   materialized remotely".
//!
//! The newtypes keep the two spaces from being mixed up at compile time.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier assigned by this process at object-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(u32);

impl LocalId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the remote simulation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(u32);

impl ServerId {
    /// The reserved "not yet materialized remotely" value.
    pub const UNASSIGNED: ServerId = ServerId(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` once a real server id has been installed.
    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing allocator for [`LocalId`]s.
///
/// One counter exists per client and is shared by all of its worlds and
/// models, so local ids are unique across the whole object tree. The first
/// id handed out is 1; zero is never produced.
///
/// The counter is atomic so an embedding application that wraps the client
/// in a lock can still allocate ids from helper threads without corruption.
pub struct IdCounter {
    inner: AtomicU32,
}

impl IdCounter {
    /// Creates a new counter whose first allocation will be 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Allocates the next local id.
    ///
    /// `Ordering::Relaxed` is sufficient: the ids are used only as keys,
    /// not for memory synchronisation between threads.
    pub fn next(&self) -> LocalId {
        LocalId(self.inner.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id the next call to [`next`](Self::next) would allocate.
    /// Useful for logging and diagnostics.
    pub fn peek(&self) -> LocalId {
        LocalId(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_id_counter_starts_at_one() {
        let counter = IdCounter::new();
        assert_eq!(counter.next(), LocalId::new(1));
    }

    #[test]
    fn test_id_counter_never_produces_zero() {
        let counter = IdCounter::new();
        for _ in 0..1000 {
            assert_ne!(counter.next().raw(), 0);
        }
    }

    #[test]
    fn test_id_counter_is_strictly_increasing() {
        let counter = IdCounter::new();
        let values: Vec<LocalId> = (0..100).map(|_| counter.next()).collect();
        for window in values.windows(2) {
            assert!(window[1] > window[0], "ids must be strictly increasing");
        }
    }

    #[test]
    fn test_id_counter_is_unique_across_threads() {
        let counter = Arc::new(IdCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<LocalId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 500, "every local id must be unique");
    }

    #[test]
    fn test_server_id_unassigned_is_zero() {
        assert_eq!(ServerId::UNASSIGNED.raw(), 0);
        assert!(!ServerId::UNASSIGNED.is_assigned());
        assert!(ServerId::new(7).is_assigned());
    }

    #[test]
    fn test_peek_does_not_allocate() {
        let counter = IdCounter::new();
        counter.next();
        assert_eq!(counter.peek(), LocalId::new(2));
        assert_eq!(counter.next(), LocalId::new(2));
    }
}

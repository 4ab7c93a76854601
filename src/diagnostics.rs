//! Process-wide diagnostic rings for kernel-daemon ordering bugs.
//!
//! Neither ring is a correctness mechanism (design §9). They exist so that a
//! stale [`crate::state_ref::StateRef`] arriving after its open-state was
//! freed shows up as a logged rejection instead of undefined behavior --
//! which in safe Rust would otherwise be impossible to reach in the first
//! place, since [`crate::state_ref::StateTable`] already refuses stale
//! generations. We keep the ring anyway because it is cheap and gives the
//! same "was this recently deleted" signal the original build-time feature
//! (`DRIVER_WORKAROUND_FOR_GETATTR_AFTER_CLOSE_HACKS`) provided, for the
//! rare case a caller logs a raw address rather than going through the table.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

const NUM_RECENTLY_DELETED: usize = 128;

/// Bounded ring of addresses that have been freed recently, looked up by a
/// linear scan. Overwrites the oldest entry once full -- `Mutex<VecDeque<_>>`
/// rather than `crossbeam_queue::ArrayQueue`, since the ring needs to be
/// scanned by value (`ArrayQueue` only exposes a draining, owned iterator).
pub struct Diagnostics {
    capacity: usize,
    deleted: Mutex<VecDeque<usize>>,
    deleted_seen: AtomicUsize,
}

static GLOBAL: OnceLock<Diagnostics> = OnceLock::new();

impl Diagnostics {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            deleted: Mutex::new(VecDeque::with_capacity(capacity)),
            deleted_seen: AtomicUsize::new(0),
        }
    }

    pub fn global() -> &'static Diagnostics {
        GLOBAL.get_or_init(|| Diagnostics::new(NUM_RECENTLY_DELETED))
    }

    /// Records `addr` as recently deleted, evicting the oldest entry if the
    /// ring is full.
    pub fn note_deleted(&self, addr: usize) {
        let mut deleted = self.deleted.lock().unwrap();
        if deleted.len() == self.capacity {
            deleted.pop_front();
            tracing::trace!("recently-deleted ring evicted an entry");
        }
        deleted.push_back(addr);
        drop(deleted);
        self.deleted_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether `addr` was recently deleted. Diagnostic only -- never used to
    /// gate a correctness decision.
    pub fn was_recently_deleted(&self, addr: usize) -> bool {
        self.deleted.lock().unwrap().iter().any(|&p| p == addr)
    }

    #[cfg(test)]
    fn seen_count(&self) -> usize {
        self.deleted_seen.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_finds_deleted_pointer() {
        let d = Diagnostics::new(4);
        d.note_deleted(0x1000);
        assert!(d.was_recently_deleted(0x1000));
        assert!(!d.was_recently_deleted(0x2000));
    }

    #[test]
    fn ring_evicts_oldest_once_full() {
        let d = Diagnostics::new(2);
        d.note_deleted(1);
        d.note_deleted(2);
        d.note_deleted(3);
        assert_eq!(d.seen_count(), 3);
        assert!(!d.was_recently_deleted(1));
        assert!(d.was_recently_deleted(2));
        assert!(d.was_recently_deleted(3));
    }
}

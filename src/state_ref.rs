//! Generation-indexed state handles (R2): what the kernel actually holds
//! across upcalls in place of a raw pointer.
//!
//! The original C daemon hands the kernel a pointer and relies on a
//! best-effort "was this pointer recently freed" probe (`isvalid`,
//! `debug_ptr_was_recently_deleted`) to catch ordering bugs after the fact.
//! A `StateRef` makes the same class of bug a guaranteed detection instead of
//! a probe: the table generation-tags each slot, so a stale handle from a
//! reused slot is rejected by generation mismatch without ever touching
//! freed memory -- a slot can only be looked up through the table, and the
//! table's own `Arc` clone is what keeps the referent alive for the call.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::open_state::OpenStateHandle;

/// A handle the kernel carries across upcalls (the downcall's `state_ref:u64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateRef {
    index: u32,
    generation: u32,
}

impl StateRef {
    /// Packs into the single `u64` the wire format carries.
    pub fn to_wire(self) -> u64 {
        (u64::from(self.index) << 32) | u64::from(self.generation)
    }

    pub fn from_wire(value: u64) -> Self {
        Self { index: (value >> 32) as u32, generation: value as u32 }
    }
}

struct Slot {
    generation: u32,
    occupied: bool,
}

/// The client-wide open-state registry (C3's "owning client's open list"),
/// and simultaneously the generation-indexed slab that issues [`StateRef`]
/// handles. One lock order rule applies throughout this crate: the
/// client-global open-list lock (here, the table's internal locks) is always
/// the outermost lock taken, per the lease-ordered hierarchy in the design's
/// concurrency section.
pub struct StateTable {
    slots: Mutex<Vec<Slot>>,
    free_list: Mutex<Vec<u32>>,
    entries: DashMap<u32, OpenStateHandle>,
    next_generation: AtomicU32,
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            free_list: Mutex::new(Vec::new()),
            entries: DashMap::new(),
            next_generation: AtomicU32::new(1),
        }
    }

    /// Publishes `state` into the table, taking what the design calls "the
    /// second reference" -- the table's stored `Arc` clone is the handle the
    /// kernel's `StateRef` now stands in for.
    pub fn insert(&self, state: OpenStateHandle) -> StateRef {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock().unwrap();
        let index = match self.free_list.lock().unwrap().pop() {
            Some(index) => {
                slots[index as usize] = Slot { generation, occupied: true };
                index
            }
            None => {
                let index = slots.len() as u32;
                slots.push(Slot { generation, occupied: true });
                index
            }
        };
        drop(slots);
        self.entries.insert(index, state);
        StateRef { index, generation }
    }

    /// Looks up a live entry, returning a cloned `Arc` for the duration of
    /// the caller's upcall -- the transient extra reference the design's
    /// concurrency section describes as being "taken under the object's
    /// existing reachability".
    pub fn get(&self, state_ref: StateRef) -> Option<OpenStateHandle> {
        let slots = self.slots.lock().unwrap();
        let slot = slots.get(state_ref.index as usize)?;
        if !slot.occupied || slot.generation != state_ref.generation {
            return None;
        }
        drop(slots);
        self.entries.get(&state_ref.index).map(|entry| entry.clone())
    }

    /// Unlinks the entry unconditionally (step 5 of the CLOSE driver);
    /// dropping the returned `Arc` releases the table's reference, and the
    /// final reference drops whenever the last transient clone elsewhere
    /// does, running [`OpenState`](crate::open_state::OpenState)'s destructor.
    pub fn remove(&self, state_ref: StateRef) -> Option<OpenStateHandle> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.get_mut(state_ref.index as usize)?;
        if !slot.occupied || slot.generation != state_ref.generation {
            return None;
        }
        slot.occupied = false;
        drop(slots);
        self.free_list.lock().unwrap().push(state_ref.index);
        self.entries.remove(&state_ref.index).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Open-state object (C3): the reference-counted root object representing a
//! single kernel-issued file OPEN.
//!
//! Reference counting is not reimplemented by hand here: the canonical owner
//! of an [`OpenState`] is the slot in [`crate::state_ref::StateTable`] that
//! the OPEN driver publishes it into, and every upcall that names the state
//! borrows a clone of the table's `Arc` for the call's duration. `ref_count
//! >= 1` while reachable, and "the destructor runs exactly once per
//! allocation" (design §8, invariant 1) both fall out of `Arc`'s own
//! invariants instead of needing a parallel hand-rolled count -- see DESIGN.md
//! for why this is the faithful translation of the original's manual
//! refcounting, not a simplification of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::delegation::{DelegationHandle, DelegationStatus};
use crate::diagnostics::Diagnostics;
use crate::nfs_rpc::NfsRpc;
use crate::owner::OpenOwner;
use crate::path::{FileHandle, FileHandleView, PathRecord};
use crate::stateid::StateId;

/// The on-server object type, established before the first server OPEN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// A single active byte-range lock. The lock subsystem itself is an external
/// collaborator (§1); this is only the sliver C6 needs to pick a stateid.
#[derive(Debug, Clone, Copy)]
pub struct LockEntry {
    pub stateid: StateId,
}

#[derive(Debug, Default)]
struct LocksState {
    list: Vec<LockEntry>,
    stateid: Option<StateId>,
}

/// Extended-attribute scratch buffer. `None` is a sentinel distinct from
/// `Some(vec![])` (an EA buffer that is present but empty).
#[derive(Debug, Default)]
struct EaState {
    buffer: Option<Vec<u8>>,
}

/// Fields mutated only under the open-state's exclusive lock (lock #2 in the
/// lease-ordered hierarchy): stateid, do_close, delegation attachment.
struct MainState {
    stateid: StateId,
    do_close: bool,
    delegation: Option<DelegationHandle>,
    srv_open: u64,
}

/// Mirrors `MainState::do_close` so C6 can block on it with a condvar without
/// requiring `std::sync::RwLock` to support condition waits (it doesn't).
/// The `RwLock` in [`MainState`] remains the source of truth for reads; this
/// pair exists purely to make "wait until do_close becomes true" observable.
struct DoCloseSignal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl DoCloseSignal {
    fn new(initial: bool) -> Self {
        Self { flag: Mutex::new(initial), cond: Condvar::new() }
    }

    fn set(&self, value: bool) {
        let mut guard = self.flag.lock().unwrap();
        *guard = value;
        if value {
            self.cond.notify_all();
        }
    }

    fn wait_until_true(&self) {
        let guard = self.flag.lock().unwrap();
        let _guard = self.cond.wait_while(guard, |done| !*done).unwrap();
    }
}

/// C3, the central open-state object.
pub struct OpenState {
    pub path: PathRecord,
    pub owner: OpenOwner,
    kind: RwLock<FileKind>,

    file: RwLock<FileHandleView>,
    parent: RwLock<FileHandleView>,

    share_access: RwLock<u32>,
    share_deny: RwLock<u32>,

    main: RwLock<MainState>,
    do_close_signal: DoCloseSignal,

    locks: Mutex<LocksState>,
    ea: Mutex<EaState>,

    rpc: Arc<dyn NfsRpc>,

    destroyed: AtomicBool,
}

impl OpenState {
    /// `create_open_state`: allocates an open-state with `ref_count == 1`
    /// (the `Arc` returned here _is_ that first reference). `kind` is the
    /// provisional type from `create_opts & DIRECTORY_FILE`; the OPEN driver
    /// corrects it once the real on-server type is known.
    pub fn new(
        path: PathRecord,
        owner: OpenOwner,
        kind: FileKind,
        rpc: Arc<dyn NfsRpc>,
    ) -> Arc<Self> {
        let parent_name = path.parent();
        let file_name = path.name();
        Arc::new(Self {
            path,
            owner,
            kind: RwLock::new(kind),
            file: RwLock::new(FileHandleView {
                handle: FileHandle::default(),
                name: file_name,
                superblock: None,
            }),
            parent: RwLock::new(FileHandleView {
                handle: FileHandle::default(),
                name: parent_name,
                superblock: None,
            }),
            share_access: RwLock::new(0),
            share_deny: RwLock::new(0),
            main: RwLock::new(MainState {
                stateid: StateId::SPECIAL,
                do_close: false,
                delegation: None,
                srv_open: 0,
            }),
            do_close_signal: DoCloseSignal::new(false),
            locks: Mutex::new(LocksState::default()),
            ea: Mutex::new(EaState::default()),
            rpc,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn rpc(&self) -> &Arc<dyn NfsRpc> {
        &self.rpc
    }

    pub fn kind(&self) -> FileKind {
        *self.kind.read().unwrap()
    }

    /// Corrects the provisional type once the real on-server type is known
    /// (SPEC_FULL §4.2 step 2/8).
    pub fn set_kind(&self, kind: FileKind) {
        *self.kind.write().unwrap() = kind;
    }

    pub fn file(&self) -> FileHandleView {
        self.file.read().unwrap().clone()
    }

    pub fn set_file(&self, view: FileHandleView) {
        *self.file.write().unwrap() = view;
    }

    pub fn parent_view(&self) -> FileHandleView {
        self.parent.read().unwrap().clone()
    }

    pub fn set_parent(&self, view: FileHandleView) {
        *self.parent.write().unwrap() = view;
    }

    pub fn share_bits(&self) -> (u32, u32) {
        (*self.share_access.read().unwrap(), *self.share_deny.read().unwrap())
    }

    /// Fixed once the OPEN succeeds; never mutated again.
    pub fn set_share_bits(&self, share_access: u32, share_deny: u32) {
        *self.share_access.write().unwrap() = share_access;
        *self.share_deny.write().unwrap() = share_deny;
    }

    pub fn stateid(&self) -> StateId {
        self.main.read().unwrap().stateid
    }

    pub fn do_close(&self) -> bool {
        self.main.read().unwrap().do_close
    }

    pub fn srv_open(&self) -> u64 {
        self.main.read().unwrap().srv_open
    }

    /// Sets the OPEN stateid and marks a CLOSE as owed. The seqid must never
    /// regress except across a whole-state recovery cycle (design §5).
    pub fn set_open_stateid(&self, stateid: StateId, srv_open: u64) {
        let mut guard = self.main.write().unwrap();
        debug_assert!(
            stateid.seqid >= guard.stateid.seqid || stateid.other != guard.stateid.other,
            "stateid seqid must not regress on the same stateid"
        );
        guard.stateid = stateid;
        guard.do_close = true;
        guard.srv_open = srv_open;
        drop(guard);
        self.do_close_signal.set(true);
    }

    /// Clears `do_close` after a CLOSE RPC is acknowledged (or after
    /// cancellation's CLOSE). Invariant 3: do_close implies no CLOSE has been
    /// sent with the current stateid; this is the only path that flips it off.
    pub fn clear_do_close(&self) {
        let mut guard = self.main.write().unwrap();
        guard.do_close = false;
        drop(guard);
        self.do_close_signal.set(false);
    }

    pub fn delegation(&self) -> Option<DelegationHandle> {
        self.main.read().unwrap().delegation.clone()
    }

    pub fn attach_delegation(&self, handle: DelegationHandle) {
        self.main.write().unwrap().delegation = Some(handle);
    }

    pub fn detach_delegation(&self) -> Option<DelegationHandle> {
        self.main.write().unwrap().delegation.take()
    }

    /// Blocks the calling (worker) thread until a recalled delegation has
    /// been converted back into an OPEN stateid (C6 step 2).
    pub fn wait_for_delegation_recovery(&self) {
        self.do_close_signal.wait_until_true();
    }

    pub fn is_delegation_granted(&self) -> bool {
        matches!(
            self.main.read().unwrap().delegation.as_ref().map(|d| d.status()),
            Some(DelegationStatus::Granted)
        )
    }

    pub fn is_delegation_recalled(&self) -> bool {
        matches!(
            self.main.read().unwrap().delegation.as_ref().map(|d| d.status()),
            Some(DelegationStatus::Recalled)
        )
    }

    pub fn lock_stateid(&self) -> Option<StateId> {
        self.locks.lock().unwrap().stateid.filter(|s| s.seqid != 0)
    }

    pub fn add_lock(&self, entry: LockEntry) {
        let mut guard = self.locks.lock().unwrap();
        guard.stateid = Some(entry.stateid);
        guard.list.push(entry);
    }

    pub fn remove_all_locks(&self) {
        let mut guard = self.locks.lock().unwrap();
        guard.list.clear();
        guard.stateid = None;
    }

    pub fn has_locks(&self) -> bool {
        !self.locks.lock().unwrap().list.is_empty()
    }

    pub fn set_ea(&self, buffer: Vec<u8>) {
        self.ea.lock().unwrap().buffer = Some(buffer);
    }

    pub fn ea(&self) -> Option<Vec<u8>> {
        self.ea.lock().unwrap().buffer.clone()
    }
}

impl std::fmt::Debug for OpenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenState")
            .field("path", &self.path.full_path())
            .field("kind", &self.kind())
            .field("stateid", &self.stateid())
            .field("do_close", &self.do_close())
            .finish()
    }
}

impl Drop for OpenState {
    /// Final destruction: asserts all locks held on this object have been
    /// released, detaches any delegation, and (behind the
    /// `getattr_after_close_workaround` feature) quarantines the freed
    /// pointer value so a stale kernel reference is detectable rather than a
    /// use-after-free.
    fn drop(&mut self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        assert!(
            self.locks.lock().unwrap().list.is_empty(),
            "open-state destroyed with locks still held"
        );
        if let Some(delegation) = self.main.get_mut().unwrap().delegation.take() {
            drop(delegation);
        }
        self.ea.lock().unwrap().buffer = None;

        #[cfg(feature = "getattr_after_close_workaround")]
        Diagnostics::global().note_deleted(self as *const Self as usize);
    }
}

pub type OpenStateHandle = Arc<OpenState>;

//! Delegation-state container: an external collaborator (§1). The client-wide
//! delegation registry owns delegation objects; an open-state only ever holds
//! a counted handle to one. The registry, not this crate, decides when a
//! delegation is recalled.
//!
//! The back-reference from a delegation to the open that holds it (via
//! `srv_open`) is deliberately a non-owning correlation key, never a counted
//! edge -- see the cyclic-references design note. Owning both directions
//! would make the pair uncollectable.

use std::sync::Arc;

use crate::error::RpcStatus;
use crate::path::FileHandle;
use crate::stateid::StateId;

/// Whether a delegation currently backs local short-circuiting, or has been
/// recalled and is pending conversion back to an OPEN stateid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DelegationStatus {
    Granted,
    Recalled,
}

/// Read or write delegation, per RFC 5661 §10.2.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DelegationKind {
    Read,
    Write,
}

/// A handle to a delegation owned by the client-wide registry. Implementors
/// live outside this crate; this trait is the entire contract we rely on.
pub trait DelegationState: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> DelegationKind;
    fn status(&self) -> DelegationStatus;
    fn stateid(&self) -> StateId;
}

pub type DelegationHandle = Arc<dyn DelegationState>;

/// Arguments the registry needs to decide whether (and what) to grant.
#[derive(Debug, Clone, Copy)]
pub struct DelegationRequest {
    pub share_access: u32,
    pub suppress: bool,
}

/// The client-wide delegation registry, consulted by the OPEN driver (C5)
/// before sending an OPEN, and by the CLOSE driver (C7) to return a
/// delegation ahead of a destructive operation.
pub trait DelegationRegistry: Send + Sync {
    /// Returns a cached delegation that already covers `file`, if the
    /// registry is willing to let us short-circuit an OPEN entirely.
    fn lookup_cached(&self, file: &FileHandle) -> Option<DelegationHandle>;

    /// Registers a fresh open with the registry; the registry may grant a
    /// delegation in response to the OPEN reply's `deleg_type`.
    fn register(
        &self,
        srv_open: u64,
        file: &FileHandle,
        request: DelegationRequest,
    ) -> Option<DelegationHandle>;

    /// Returns (DELEGRETURNs) a held delegation to the server.
    fn return_delegation(&self, handle: &DelegationHandle) -> Result<(), RpcStatus>;

    /// Drops the registry's `srv_open` correlation for this delegation,
    /// without returning it to the server.
    fn detach_srv_open(&self, srv_open: u64);
}

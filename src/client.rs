//! The owning client: the collaborator bundle plus the open-state registry
//! that C5/C6/C7/C8 all operate against. "Client" here names one mounted
//! filesystem's worth of shared state, not a network peer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::delegation::DelegationRegistry;
use crate::nfs_rpc::{IdMapper, LayoutCollaborator, NfsRpc};
use crate::state_ref::StateTable;

/// Everything the OPEN/CLOSE drivers need beyond the open-state itself.
pub struct Client {
    pub rpc: Arc<dyn NfsRpc>,
    pub delegations: Arc<dyn DelegationRegistry>,
    pub layouts: Arc<dyn LayoutCollaborator>,
    pub idmap: Arc<dyn IdMapper>,
    pub config: DaemonConfig,
    /// The open-state list (design §3): every published open-state is
    /// reachable here for iteration by crash/recovery.
    pub open_states: StateTable,
    srv_open_counter: AtomicU64,
}

impl Client {
    pub fn new(
        rpc: Arc<dyn NfsRpc>,
        delegations: Arc<dyn DelegationRegistry>,
        layouts: Arc<dyn LayoutCollaborator>,
        idmap: Arc<dyn IdMapper>,
        config: DaemonConfig,
    ) -> Self {
        Self {
            rpc,
            delegations,
            layouts,
            idmap,
            config,
            open_states: StateTable::new(),
            srv_open_counter: AtomicU64::new(1),
        }
    }

    /// Issues a fresh correlation id for a server-side open, used to match a
    /// delegation back to the open-state that requested it without the two
    /// holding counted references to each other.
    pub fn next_srv_open(&self) -> u64 {
        self.srv_open_counter.fetch_add(1, Ordering::Relaxed)
    }
}

//! CLOSE driver (C7): layout return, delegation detach, silly-rename handling
//! for a still-open unlinked file, the final CLOSE RPC, and unconditional
//! removal from the client's open list. SPEC_FULL.md §4.4.
//!
//! Status precedence: the return code reflects CLOSE's status if present,
//! otherwise REMOVE's -- this driver never silently swallows either.

use tracing::warn;

use crate::client::Client;
use crate::delegation::DelegationKind;
use crate::error::{nfs_to_host_error, CloseError, HostStatus, NfsStatus};
use crate::nfs_rpc::SetAttrs;
use crate::open_state::{FileKind, OpenState};
use crate::state_ref::StateRef;

#[derive(Debug, Clone, Copy)]
pub struct CloseRequest {
    pub state_ref: StateRef,
    /// REMOVE the file as part of this close.
    pub remove: bool,
    /// The kernel already renamed the file out of the way (delete-on-close
    /// against a file with other live handles); silly-rename it ourselves
    /// first rather than removing directly.
    pub renamed: bool,
    /// The kernel's `srv_open` correlation id for this close, checked
    /// against the open-state's before detaching the delegation mapping.
    pub srv_open: u64,
}

fn silly_rename_name(state: &OpenState) -> String {
    format!(".nfs4_silly_{:016x}", state.srv_open())
}

/// Sends CLOSE with the current stateid and clears `do_close` on success.
fn send_close(client: &Client, state: &OpenState, handle: &crate::path::FileHandle) -> Result<(), CloseError> {
    client.rpc.close(handle, state.stateid())?;
    state.clear_do_close();
    Ok(())
}

/// Step 3 of SPEC_FULL §4.4: the REMOVE path, silly-rename variant and plain
/// variant with its single CLOSE-then-retry on `FILE_OPEN`.
fn handle_remove(client: &Client, state: &OpenState, renamed: bool) -> Result<(), CloseError> {
    let file = state.file();
    let parent = state.parent_view();

    if renamed {
        let silly = silly_rename_name(state);
        client.rpc.rename(&parent.handle, &file.name, &parent.handle, &silly)?;
        if state.do_close() {
            send_close(client, state, &file.handle)?;
        }
        client.rpc.remove(&parent.handle, &silly)?;
        return Ok(());
    }

    if let Some(delegation) = state.delegation() {
        if matches!(delegation.kind(), DelegationKind::Write) {
            if let Err(err) = client.delegations.return_delegation(&delegation) {
                warn!(?err, "failed to return write delegation before remove");
            }
            state.detach_delegation();
        }
    }
    let _ = client.rpc.setattr(&file.handle, &SetAttrs { mode: None, size: Some(0) });

    match client.rpc.remove(&parent.handle, &file.name) {
        Ok(()) => Ok(()),
        Err(NfsStatus::FileOpen) => {
            // Only this client can hold the open (SPEC_FULL §4.4 step 3);
            // one CLOSE-then-retry is sufficient, never an unbounded loop.
            if state.do_close() {
                send_close(client, state, &file.handle)?;
            }
            client.rpc.remove(&parent.handle, &file.name)?;
            Ok(())
        }
        Err(status) => Err(status.into()),
    }
}

/// `close_open_state`: the full CLOSE algorithm.
pub fn close(client: &Client, req: CloseRequest) -> Result<(), HostStatus> {
    let Some(state) = client.open_states.get(req.state_ref) else {
        // Already closed (or a stale/duplicate downcall); nothing to do.
        return Ok(());
    };

    // Step 1: release any pNFS layouts before touching the file further.
    let file = state.file();
    if state.kind() == FileKind::Regular && !file.handle.is_empty() {
        if let Err(err) = client.layouts.close_layouts(&file.handle) {
            warn!(?err, "layout return failed during close");
        }
    }

    // Step 2: srv_open-matched delegation-correlation detach.
    if req.srv_open == state.srv_open() {
        client.delegations.detach_srv_open(state.srv_open());
    }

    // Step 3.
    let remove_result = if req.remove { handle_remove(client, &state, req.renamed) } else { Ok(()) };

    // Step 4: the final CLOSE, only if an OPEN stateid is still outstanding
    // (handle_remove may already have cleared it).
    let close_result = if state.do_close() {
        let file = state.file();
        send_close(client, &state, &file.handle)
    } else {
        Ok(())
    };

    // Step 5: unconditional unlink from the open list regardless of the RPC
    // outcomes above -- a failed CLOSE still must not leave a state reachable
    // forever (design §5).
    client.open_states.remove(req.state_ref);
    drop(state);

    match (close_result, remove_result) {
        (Err(err), _) => Err(err.to_host()),
        (Ok(()), Err(err)) => Err(err.to_host()),
        (Ok(()), Ok(())) => Ok(()),
    }
}

impl CloseError {
    fn to_host(&self) -> HostStatus {
        match self {
            CloseError::Nfs(status) => nfs_to_host_error(*status, HostStatus::InternalError),
            CloseError::Rpc(_) => HostStatus::InternalError,
        }
    }
}

//! Cancellation / rollback (C8): undoes partial OPEN work when the
//! dispatcher learns the caller went away between `handle` and `marshal`.
//! SPEC_FULL.md §4.5.

use tracing::warn;

use crate::client::Client;
use crate::error::HostStatus;
use crate::open_driver::OpenOutcome;
use crate::stateid_selector;

/// Rolls back the effects of a just-completed OPEN that the kernel is about
/// to discard without ever seeing. `outcome` must be the exact value `open()`
/// returned; a [`OpenOutcome::Reparse`] never created state and is a no-op.
pub fn cancel(client: &Client, outcome: &OpenOutcome) {
    let info = match outcome {
        OpenOutcome::Reparse { .. } => return,
        OpenOutcome::Opened(info) => info,
    };

    let Some(state) = client.open_states.get(info.state_ref) else {
        // Already unwound by a racing close; nothing left to do.
        return;
    };

    if state.do_close() {
        let file = state.file();
        let (stateid, _) = stateid_selector::select(&state);
        if let Err(err) = client.rpc.close(&file.handle, stateid) {
            warn!(?err, "cancel: close failed during rollback");
        } else {
            state.clear_do_close();
        }
    } else if info.created {
        if let Some(delegation) = state.detach_delegation() {
            if let Err(err) = client.delegations.return_delegation(&delegation) {
                warn!(?err, "cancel: delegation return failed during rollback");
            }
        }
        let file = state.file();
        let parent = state.parent_view();
        if !parent.handle.is_empty() || !parent.name.is_empty() {
            if let Err(err) = client.rpc.remove(&parent.handle, &file.name) {
                warn!(?err, "cancel: remove failed during rollback");
            }
        }
    }

    client.open_states.remove(info.state_ref);
    drop(state);
}

/// Maps a rollback outcome to the host status the dispatcher should still
/// report for the abandoned upcall, when it needs one at all.
pub fn cancel_to_host(_outcome: &OpenOutcome) -> HostStatus {
    HostStatus::Success
}

//! Stateid selector (C6): on every I/O request, picks the delegation, lock,
//! open, or special stateid per RFC 5661 §8.2.5. Read-only with respect to
//! the open-state: run entirely under shared/read locks, never mutating.

use crate::open_state::OpenState;
use crate::stateid::{StateId, StateidType};

/// Chooses the stateid for an operation against `state`. Blocks the calling
/// thread if a delegation has been recalled and the OPEN stateid recovery is
/// still in flight (step 2) -- this is the one suspension point in an
/// otherwise lock-only read path.
pub fn select(state: &OpenState) -> (StateId, StateidType) {
    if state.is_delegation_granted() {
        if let Some(delegation) = state.delegation() {
            return (delegation.stateid(), StateidType::DelegFile);
        }
    }

    if state.is_delegation_recalled() {
        state.wait_for_delegation_recovery();
        // Falls through: do_close is now true (CLAIM_DELEGATE_CUR recovered
        // an OPEN stateid), so the `do_close` arm below picks it up.
    }

    if let Some(lock_stateid) = state.lock_stateid() {
        return (lock_stateid, StateidType::Lock);
    }

    if state.do_close() {
        return (state.stateid(), StateidType::Open);
    }

    (StateId::SPECIAL, StateidType::Special)
}

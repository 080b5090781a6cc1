//! Snapshot / apply / persist / restore.

use aclgate_core::error::Result;

/// Apply `change` to `state` and persist the result. If persisting fails the
/// whole pre-change state is restored and the persistence error returned, so
/// no partial mutation is ever observable.
pub fn persist_or_rollback<T, F, P>(state: &mut T, change: F, persist: P) -> Result<()>
where
    T: Clone,
    F: FnOnce(&mut T),
    P: FnOnce(&T) -> Result<()>,
{
    let snapshot = state.clone();
    change(state);
    if let Err(e) = persist(state) {
        *state = snapshot;
        return Err(e);
    }
    Ok(())
}

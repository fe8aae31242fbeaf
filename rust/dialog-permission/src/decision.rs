use crate::{AccessDenied, Permission, Permissions};
use tracing::trace;

/// Whether `granted` implies `requested`.
///
/// This is the access decision: `true` grants the request. A request of a
/// kind that `granted` holds no store for is denied, unless the universal
/// permission covers it.
pub fn implies(granted: &Permissions, requested: &dyn Permission) -> bool {
    let decision = granted.implies(requested);
    trace!(%requested, decision, "Access decision");
    decision
}

/// Like [`implies`], but reports a denial as an [`AccessDenied`].
pub fn check(granted: &Permissions, requested: &dyn Permission) -> Result<(), AccessDenied> {
    if implies(granted, requested) {
        Ok(())
    } else {
        Err(AccessDenied::new(format!("{requested} is not granted")))
    }
}

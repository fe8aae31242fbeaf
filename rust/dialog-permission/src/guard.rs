use crate::{AccessDenied, Permission, Permissions};
use serde::ser::{Error, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::debug;

/// Decides whether the payload of a [`Guarded`] may be handed out.
pub trait Guard<T: ?Sized>: Send + Sync {
    /// `Ok` to allow access to `payload`, or the reason it is refused.
    fn check(&self, payload: &T) -> Result<(), AccessDenied>;
}

impl<T, F> Guard<T> for F
where
    T: ?Sized,
    F: Fn(&T) -> Result<(), AccessDenied> + Send + Sync,
{
    fn check(&self, payload: &T) -> Result<(), AccessDenied> {
        self(payload)
    }
}

/// A value that is only released after its guard allows it.
///
/// Every way of getting at the payload, serialization included, consults the
/// guard first. Without a guard access is always allowed.
///
/// ```
/// use dialog_permission::{AccessDenied, Guarded};
/// use std::sync::Arc;
///
/// let secret = Guarded::new("hunter2", Arc::new(|_: &&str| -> Result<(), AccessDenied> {
///     Err(AccessDenied::new("no"))
/// }));
/// assert!(secret.access().is_err());
///
/// let public = Guarded::unguarded("hello");
/// assert_eq!(public.access(), Ok(&"hello"));
/// ```
pub struct Guarded<T> {
    payload: T,
    guard: Option<Arc<dyn Guard<T>>>,
}

impl<T> Guarded<T> {
    /// Protect `payload` with `guard`.
    pub fn new(payload: T, guard: Arc<dyn Guard<T>>) -> Self {
        Self {
            payload,
            guard: Some(guard),
        }
    }

    /// Wrap `payload` without a guard.
    pub fn unguarded(payload: T) -> Self {
        Self {
            payload,
            guard: None,
        }
    }

    /// Whether a guard protects the payload.
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    fn check(&self) -> Result<(), AccessDenied> {
        match &self.guard {
            Some(guard) => guard.check(&self.payload).inspect_err(|denied| {
                debug!(reason = %denied.reason, "Guard refused access");
            }),
            None => Ok(()),
        }
    }

    /// Borrow the payload if the guard allows it.
    pub fn access(&self) -> Result<&T, AccessDenied> {
        self.check()?;
        Ok(&self.payload)
    }

    /// Take the payload if the guard allows it.
    pub fn into_inner(self) -> Result<T, AccessDenied> {
        self.check()?;
        Ok(self.payload)
    }
}

impl<T> Debug for Guarded<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("guarded", &self.is_guarded())
            .finish_non_exhaustive()
    }
}

impl<T: Serialize> Serialize for Guarded<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.check().map_err(S::Error::custom)?;
        self.payload.serialize(serializer)
    }
}

/// Guard that allows access only while a granted permission set implies a
/// required permission.
///
/// The set is consulted on every check, so permissions granted after the
/// guard was built are taken into account.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    granted: Arc<Permissions>,
    required: Arc<dyn Permission>,
}

impl PermissionGuard {
    /// Require `required` from `granted`.
    pub fn new(granted: Arc<Permissions>, required: Arc<dyn Permission>) -> Self {
        Self { granted, required }
    }

    /// The permission this guard requires.
    pub fn required(&self) -> &Arc<dyn Permission> {
        &self.required
    }
}

impl<T: ?Sized> Guard<T> for PermissionGuard {
    fn check(&self, _payload: &T) -> Result<(), AccessDenied> {
        if crate::implies(&self.granted, &*self.required) {
            Ok(())
        } else {
            Err(AccessDenied::new(format!("{} is not granted", self.required)))
        }
    }
}

use crate::{DialogPermissionError, Kind, Permission};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A collection of permissions that all share one declared [`Kind`].
///
/// Stores are shared between threads: `add` and `implies` may be called
/// concurrently, and `implies` never observes a partially inserted
/// permission.
pub trait PermissionStore: Debug + Send + Sync {
    /// The kind every permission in this store has.
    fn kind(&self) -> &Kind;

    /// Insert a permission. Duplicates are kept as is.
    ///
    /// Fails with [`DialogPermissionError::TypeMismatch`] when the permission
    /// is of another type and with [`DialogPermissionError::ReadOnly`] once
    /// the store is frozen.
    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError>;

    /// Whether any permission held by this store implies `requested`.
    fn implies(&self, requested: &dyn Permission) -> bool;

    /// Make this store read-only. Calling it again has no effect.
    fn freeze(&self);

    /// Whether [`PermissionStore::freeze`] has been called.
    fn is_read_only(&self) -> bool;

    /// Snapshot of the permissions currently held.
    fn elements(&self) -> Elements;

    /// Number of permissions held.
    fn len(&self) -> usize {
        self.elements().len()
    }

    /// Whether the store holds no permissions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Access to the concrete store type.
    fn as_any(&self) -> &dyn Any;
}

/// Read-only flag of a store or permission set.
///
/// The flag is set with release ordering and read with acquire ordering, so
/// an `add` that starts after `freeze` returned sees it. An `add` that races
/// a concurrent `freeze` may still get through; that one extra insertion at
/// the freeze boundary is accepted.
#[derive(Debug, Default)]
pub struct ReadOnly(AtomicBool);

impl ReadOnly {
    /// Set the flag. Returns `true` if this call is the one that set it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Current value of the flag.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fails with [`DialogPermissionError::ReadOnly`] when the flag is set.
    pub fn check(&self) -> Result<(), DialogPermissionError> {
        if self.get() {
            Err(DialogPermissionError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

/// Finite iterator over a snapshot of a store's permissions.
///
/// Cloning restarts iteration from the point the clone was taken; use
/// [`Elements::rewind`] to start over from the beginning.
#[derive(Debug, Clone)]
pub struct Elements {
    items: Arc<[Arc<dyn Permission>]>,
    position: usize,
}

impl Elements {
    /// A fresh iterator over the same snapshot.
    pub fn rewind(&self) -> Self {
        Self {
            items: self.items.clone(),
            position: 0,
        }
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Vec::<Arc<dyn Permission>>::new().into()
    }
}

impl From<Vec<Arc<dyn Permission>>> for Elements {
    fn from(items: Vec<Arc<dyn Permission>>) -> Self {
        Self {
            items: items.into(),
            position: 0,
        }
    }
}

impl Iterator for Elements {
    type Item = Arc<dyn Permission>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.position)?.clone();
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Elements {}

/// Fails with [`DialogPermissionError::TypeMismatch`] unless `permission` is
/// of the `expected` kind and of concrete type `P`.
pub(crate) fn expect_type<'a, P: Permission>(
    expected: &Kind,
    permission: &'a dyn Permission,
) -> Result<&'a P, DialogPermissionError> {
    let found = permission.kind();
    match permission.downcast_ref::<P>() {
        Some(concrete) if &found == expected => Ok(concrete),
        _ => Err(DialogPermissionError::TypeMismatch {
            expected: expected.clone(),
            found,
        }),
    }
}

/// Store used for permission types that do not provide their own.
///
/// Answers `implies` by asking every held permission in turn. All members
/// share one concrete type: the one the store was created for, or else the
/// type of the first permission added.
#[derive(Debug)]
pub struct GenericStore {
    kind: Kind,
    concrete: OnceLock<TypeId>,
    permissions: RwLock<Vec<Arc<dyn Permission>>>,
    read_only: ReadOnly,
}

impl GenericStore {
    /// Create an empty store for permissions of `kind`.
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: kind.into(),
            concrete: OnceLock::new(),
            permissions: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }

    /// Create an empty store for the kind and concrete type of `prototype`.
    pub fn for_type(prototype: &dyn Permission) -> Self {
        Self {
            kind: prototype.kind(),
            concrete: OnceLock::from(prototype.concrete_type()),
            permissions: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }
}

impl PermissionStore for GenericStore {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        let found = permission.kind();
        if found != self.kind {
            return Err(DialogPermissionError::TypeMismatch {
                expected: self.kind.clone(),
                found,
            });
        }
        self.read_only.check()?;

        let concrete = permission.concrete_type();
        let mut permissions = self.permissions.write();
        if *self.concrete.get_or_init(|| concrete) != concrete {
            return Err(DialogPermissionError::TypeMismatch {
                expected: self.kind.clone(),
                found,
            });
        }
        permissions.push(permission);
        Ok(())
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        self.permissions
            .read()
            .iter()
            .any(|granted| granted.implies(requested))
    }

    fn freeze(&self) {
        if self.read_only.set() {
            debug!(kind = %self.kind, "Froze permission store");
        }
    }

    fn is_read_only(&self) -> bool {
        self.read_only.get()
    }

    fn elements(&self) -> Elements {
        self.permissions.read().clone().into()
    }

    fn len(&self) -> usize {
        self.permissions.read().len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

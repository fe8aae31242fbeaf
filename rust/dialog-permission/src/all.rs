use crate::{
    DialogPermissionError, Elements, Kind, Permission, PermissionStore, PermissionType, ReadOnly,
    store::expect_type,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// The universal permission: it implies every other permission.
///
/// It carries no state, so all instances are equal and hash the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllPermission;

impl AllPermission {
    /// Name reported by every instance.
    pub const NAME: &'static str = "<all permissions>";
}

impl Permission for AllPermission {
    fn kind(&self) -> Kind {
        Kind::from_static(Self::KIND)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn implies(&self, _requested: &dyn Permission) -> bool {
        true
    }

    fn new_store(&self) -> Option<Box<dyn PermissionStore>> {
        Some(Box::new(AllStore::new()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PermissionType for AllPermission {
    const KIND: &'static str = "all";

    fn construct(_name: &str, _actions: Option<&str>) -> Result<Self, DialogPermissionError> {
        Ok(AllPermission)
    }
}

/// Store dedicated to [`AllPermission`].
///
/// Once it holds a single element it implies any permission it is asked
/// about. Anything other than an [`AllPermission`] is rejected.
#[derive(Debug)]
pub struct AllStore {
    kind: Kind,
    permissions: RwLock<Vec<Arc<dyn Permission>>>,
    read_only: ReadOnly,
}

impl AllStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            kind: Kind::from_static(AllPermission::KIND),
            permissions: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }
}

impl Default for AllStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore for AllStore {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        expect_type::<AllPermission>(&self.kind, &*permission)?;
        self.read_only.check()?;
        self.permissions.write().push(permission);
        Ok(())
    }

    fn implies(&self, _requested: &dyn Permission) -> bool {
        !self.permissions.read().is_empty()
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

#[cfg(test)]
mod tests {
    use crate::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(permission: &dyn Permission) -> u64 {
        let mut hasher = DefaultHasher::new();
        permission.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn it_implies_anything() {
        let all = AllPermission;
        assert!(all.implies(&AllPermission));
        assert!(all.implies(&FilePermission::new("/etc/passwd", "write").unwrap()));
        assert!(all.implies(&NamedPermission::new("runtime", "exit").unwrap()));
    }

    #[test]
    fn it_is_equal_to_every_other_instance() {
        let one = AllPermission.into_shared();
        let two = AllPermission::construct("ignored", Some("ignored")).unwrap().into_shared();

        assert!(*one == *two);
        assert_eq!(hash_of(&*one), hash_of(&*two));
    }

    #[test]
    fn it_implies_nothing_while_empty() {
        let store = AllStore::new();
        assert!(!store.implies(&AllPermission));

        store.add(AllPermission.into_shared()).unwrap();
        assert!(store.implies(&AllPermission));
        assert!(store.implies(&FilePermission::new("/tmp/a", "read").unwrap()));
    }

    #[test]
    fn it_rejects_other_permission_types() {
        let store = AllStore::new();
        let result = store.add(NamedPermission::new("runtime", "everything").unwrap().into_shared());

        assert!(matches!(
            result,
            Err(DialogPermissionError::TypeMismatch { .. })
        ));
        assert!(store.is_empty());
    }
}

use crate::{
    AllPermission, DeferredPermission, DeferredStore, DialogPermissionError, Elements,
    GenericStore, Kind, Permission, PermissionStore, PermissionType, PermissionsConfig,
    ReadOnly, TrustVerifier, TypeLoader, UniversalScope,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts of what a resolution pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Entries bound to a concrete permission.
    pub resolved: usize,
    /// Entries whose type is still unavailable.
    pub unavailable: usize,
    /// Entries that failed permanently.
    pub failed: usize,
}

impl ResolutionReport {
    fn merge(&mut self, other: ResolutionReport) {
        self.resolved += other.resolved;
        self.unavailable += other.unavailable;
        self.failed += other.failed;
    }
}

/// A heterogeneous set of granted permissions.
///
/// Permissions are routed by [`Kind`] to one [`PermissionStore`] per kind,
/// created on first use through [`Permission::new_store`] (or a
/// [`GenericStore`] when the type has none). [`DeferredPermission`]s wait in
/// a [`DeferredStore`] until [`Permissions::resolve`] binds them.
///
/// ```
/// use dialog_permission::{NamedPermission, Permission, Permissions};
///
/// let granted = Permissions::new();
/// granted.add(NamedPermission::new("FileRead", "/tmp/a")?.into_shared())?;
///
/// assert!(granted.implies(&NamedPermission::new("FileRead", "/tmp/a")?));
/// assert!(!granted.implies(&NamedPermission::new("FileRead", "/tmp/b")?));
/// # Ok::<(), dialog_permission::DialogPermissionError>(())
/// ```
#[derive(Debug, Default)]
pub struct Permissions {
    stores: RwLock<HashMap<Kind, Arc<dyn PermissionStore>>>,
    deferred: DeferredStore,
    read_only: ReadOnly,
    config: PermissionsConfig,
}

impl Permissions {
    /// An empty set with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set with the given settings.
    pub fn with_config(config: PermissionsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Settings of this set.
    pub fn config(&self) -> &PermissionsConfig {
        &self.config
    }

    /// Grant a permission.
    ///
    /// Fails with [`DialogPermissionError::ReadOnly`] once the set is frozen,
    /// and with whatever the kind's store reports otherwise.
    pub fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        self.read_only.check()?;
        if permission.is::<DeferredPermission>() {
            return self.deferred.add(permission);
        }
        self.store_for(&*permission).add(permission)
    }

    fn store_for(&self, permission: &dyn Permission) -> Arc<dyn PermissionStore> {
        let kind = permission.kind();
        if let Some(store) = self.stores.read().get(&kind) {
            return store.clone();
        }

        self.stores
            .write()
            .entry(kind)
            .or_insert_with_key(|kind| {
                let store: Arc<dyn PermissionStore> = match permission.new_store() {
                    Some(store) => Arc::from(store),
                    None => Arc::new(GenericStore::for_type(permission)),
                };
                // A freeze that already cascaded cannot have seen this store.
                if self.read_only.get() {
                    store.freeze();
                }
                debug!(%kind, "Created permission store");
                store
            })
            .clone()
    }

    /// Whether the granted permissions imply `requested`.
    pub fn implies(&self, requested: &dyn Permission) -> bool {
        let kind = requested.kind();
        let (universal, store) = {
            let stores = self.stores.read();
            let universal = match self.config.universal {
                UniversalScope::Aggregate => stores.get(AllPermission::KIND).cloned(),
                UniversalScope::Kind => None,
            };
            (universal, stores.get(&kind).cloned())
        };

        if universal.is_some_and(|all| all.implies(requested)) {
            return true;
        }
        if store.is_some_and(|store| store.implies(requested)) {
            return true;
        }
        self.deferred.implies(requested)
    }

    /// Make this set and every store in it read-only.
    pub fn freeze(&self) {
        let newly = self.read_only.set();
        for store in self.stores.read().values() {
            store.freeze();
        }
        self.deferred.freeze();
        if newly {
            debug!("Froze permission set");
        }
    }

    /// Whether [`Permissions::freeze`] has been called.
    pub fn is_read_only(&self) -> bool {
        self.read_only.get()
    }

    /// The store holding permissions of `kind`, if one was created.
    pub fn store(&self, kind: &str) -> Option<Arc<dyn PermissionStore>> {
        self.stores.read().get(kind).cloned()
    }

    /// Kinds that have a store, in order.
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<_> = self.stores.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Deferred permissions waiting to be resolved, or that failed to.
    pub fn deferred(&self) -> &DeferredStore {
        &self.deferred
    }

    /// Snapshot of every permission in the set, grouped by kind, deferred
    /// entries last.
    pub fn elements(&self) -> Elements {
        let stores: Vec<_> = {
            let stores = self.stores.read();
            let mut stores: Vec<_> = stores.values().cloned().collect();
            stores.sort_by(|a, b| a.kind().cmp(b.kind()));
            stores
        };
        stores
            .iter()
            .flat_map(|store| store.elements())
            .chain(self.deferred.elements())
            .collect::<Vec<_>>()
            .into()
    }

    /// Number of permissions in the set, deferred entries included.
    pub fn len(&self) -> usize {
        let granted: usize = self.stores.read().values().map(|store| store.len()).sum();
        granted + self.deferred.len()
    }

    /// Whether the set holds no permissions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to bind every pending deferred permission, loading each type once.
    pub fn resolve(&self, loader: &dyn TypeLoader, verifier: &dyn TrustVerifier) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        for type_name in self.deferred.pending_types() {
            report.merge(self.resolve_type(&type_name, loader, verifier));
        }
        report
    }

    /// Try to bind the pending deferred permissions declared for `type_name`.
    ///
    /// Entries are taken from the deferred store before the loader and the
    /// verifier run, so neither is called while a lock of this set is held.
    /// Bound permissions move into their kind's store; while the set is
    /// frozen they stay in the deferred store, which still answers for them.
    pub fn resolve_type(
        &self,
        type_name: &str,
        loader: &dyn TypeLoader,
        verifier: &dyn TrustVerifier,
    ) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        let pending = self.deferred.pending(type_name);
        if pending.is_empty() {
            return report;
        }

        let factory = loader.load(type_name);
        let mut moved = Vec::new();
        for entry in pending {
            let Some(deferred) = entry.downcast_ref::<DeferredPermission>() else {
                continue;
            };
            match deferred.settle(factory.as_deref(), verifier) {
                Ok(permission) => {
                    report.resolved += 1;
                    if !self.read_only.get() && self.store_for(&*permission).add(permission).is_ok() {
                        moved.push(entry.clone());
                    }
                }
                Err(error) if error.is_recoverable() => report.unavailable += 1,
                Err(_) => report.failed += 1,
            }
        }
        self.deferred.remove(type_name, &moved);

        debug!(
            type_name,
            resolved = report.resolved,
            unavailable = report.unavailable,
            failed = report.failed,
            "Resolved deferred permissions"
        );
        report
    }
}

impl TryFrom<Vec<Arc<dyn Permission>>> for Permissions {
    type Error = DialogPermissionError;

    fn try_from(permissions: Vec<Arc<dyn Permission>>) -> Result<Self, Self::Error> {
        let set = Self::new();
        for permission in permissions {
            set.add(permission)?;
        }
        Ok(set)
    }
}

impl FromIterator<Arc<dyn Permission>> for Permissions {
    /// Permissions rejected by their store are skipped with a warning; use
    /// [`TryFrom`] to fail on the first rejection instead.
    fn from_iter<I: IntoIterator<Item = Arc<dyn Permission>>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Arc<dyn Permission>> for Permissions {
    fn extend<I: IntoIterator<Item = Arc<dyn Permission>>>(&mut self, iter: I) {
        for permission in iter {
            if let Err(error) = self.add(permission.clone()) {
                warn!(%permission, %error, "Skipped permission");
            }
        }
    }
}

use crate::{
    DialogPermissionError, Elements, Kind, Permission, PermissionFactory, PermissionStore,
    ReadOnly, Signer, TrustVerifier, TypeLoader, store::expect_type,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Where a [`DeferredPermission`] is in its lifecycle.
///
/// `Unresolved` moves to either `Resolved` or `Failed` at most once, and
/// never back.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The permission type has not been bound yet.
    Unresolved,
    /// Bound to a concrete permission.
    Resolved(Arc<dyn Permission>),
    /// Binding failed permanently.
    Failed(DialogPermissionError),
}

impl Resolution {
    /// Whether the permission is still waiting to be bound.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

#[derive(Debug)]
enum Settled {
    Resolved(Arc<dyn Permission>),
    Failed(DialogPermissionError),
}

/// A permission whose type could not be instantiated when it was granted.
///
/// It records the declared type name, name, actions and the signers that
/// must vouch for the type. Until it is resolved it implies nothing; once
/// [`DeferredPermission::resolve`] binds it, it behaves exactly like the
/// concrete permission it was bound to.
#[derive(Debug)]
pub struct DeferredPermission {
    type_name: String,
    name: String,
    actions: Option<String>,
    signers: Option<Vec<Signer>>,
    settled: OnceLock<Settled>,
}

impl DeferredPermission {
    /// Kind shared by every deferred permission.
    pub const KIND: &'static str = "deferred";

    /// Create a deferred permission for the type named `type_name`.
    pub fn new(
        type_name: impl Into<String>,
        name: impl Into<String>,
        actions: Option<String>,
        signers: Option<Vec<Signer>>,
    ) -> Result<Self, DialogPermissionError> {
        let type_name = type_name.into();
        if type_name.is_empty() {
            return Err(DialogPermissionError::invalid(
                Self::KIND,
                "type name must not be empty",
            ));
        }

        Ok(Self {
            type_name,
            name: name.into(),
            actions,
            signers,
            settled: OnceLock::new(),
        })
    }

    /// Name of the permission type this will be bound to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Signers that must vouch for the permission type, if any.
    pub fn signers(&self) -> Option<&[Signer]> {
        self.signers.as_deref()
    }

    /// Current lifecycle state.
    pub fn resolution(&self) -> Resolution {
        match self.settled.get() {
            None => Resolution::Unresolved,
            Some(Settled::Resolved(permission)) => Resolution::Resolved(permission.clone()),
            Some(Settled::Failed(error)) => Resolution::Failed(error.clone()),
        }
    }

    /// The concrete permission, once resolved.
    pub fn resolved(&self) -> Option<&Arc<dyn Permission>> {
        match self.settled.get() {
            Some(Settled::Resolved(permission)) => Some(permission),
            _ => None,
        }
    }

    /// Bind this permission to its concrete type.
    ///
    /// - [`DialogPermissionError::TypeUnavailable`] when `loader` does not know
    ///   the type; the permission stays unresolved and can be retried.
    /// - [`DialogPermissionError::SignerMismatch`] when `verifier` rejects the
    ///   signers, and [`DialogPermissionError::InvalidPermission`] when the
    ///   type rejects the name or actions. Both are permanent: later calls
    ///   return the same error without consulting the loader again.
    ///
    /// On success the concrete permission is cached and returned by every
    /// later call.
    pub fn resolve(
        &self,
        loader: &dyn TypeLoader,
        verifier: &dyn TrustVerifier,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        if let Some(settled) = self.settled.get() {
            return Self::outcome(settled);
        }
        let factory = loader.load(&self.type_name);
        self.settle(factory.as_deref(), verifier)
    }

    /// Resolution with an already loaded factory, so a batch of entries of
    /// one type shares a single load.
    pub(crate) fn settle(
        &self,
        factory: Option<&dyn PermissionFactory>,
        verifier: &dyn TrustVerifier,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        if let Some(settled) = self.settled.get() {
            return Self::outcome(settled);
        }
        let Some(factory) = factory else {
            debug!(type_name = %self.type_name, "Permission type not available yet");
            return Err(DialogPermissionError::TypeUnavailable(self.type_name.clone()));
        };

        let attempt = self.bind(factory, verifier);
        let settled = match attempt {
            Ok(permission) => Settled::Resolved(permission),
            Err(error) => {
                warn!(type_name = %self.type_name, name = %self.name, %error, "Deferred permission failed to resolve");
                Settled::Failed(error)
            }
        };
        // A concurrent resolution may have settled first; its outcome wins.
        let _ = self.settled.set(settled);
        match self.settled.get() {
            Some(settled) => Self::outcome(settled),
            None => Err(DialogPermissionError::TypeUnavailable(self.type_name.clone())),
        }
    }

    fn bind(
        &self,
        factory: &dyn PermissionFactory,
        verifier: &dyn TrustVerifier,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        if let Some(signers) = &self.signers {
            if !verifier.verify(&self.type_name, signers) {
                return Err(DialogPermissionError::SignerMismatch {
                    type_name: self.type_name.clone(),
                    signers: signers.clone(),
                });
            }
        }
        let permission = factory.construct(&self.name, self.actions.as_deref())?;
        debug!(type_name = %self.type_name, %permission, "Resolved deferred permission");
        Ok(permission)
    }

    fn outcome(settled: &Settled) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        match settled {
            Settled::Resolved(permission) => Ok(permission.clone()),
            Settled::Failed(error) => Err(error.clone()),
        }
    }
}

impl Permission for DeferredPermission {
    fn kind(&self) -> Kind {
        Kind::from_static(Self::KIND)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Option<&str> {
        self.actions.as_deref()
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        self.resolved()
            .is_some_and(|permission| permission.implies(requested))
    }

    fn new_store(&self) -> Option<Box<dyn PermissionStore>> {
        Some(Box::new(DeferredStore::new()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn same_as(&self, other: &dyn Permission) -> bool {
        match other.downcast_ref::<DeferredPermission>() {
            Some(other) => {
                self.type_name == other.type_name
                    && self.name == other.name
                    && self.actions == other.actions
                    && self.signers == other.signers
            }
            None => false,
        }
    }
}

/// Store of [`DeferredPermission`]s, grouped by declared type name so that
/// one successful type load can resolve every entry of that type.
#[derive(Debug)]
pub struct DeferredStore {
    kind: Kind,
    groups: RwLock<BTreeMap<String, Vec<Arc<dyn Permission>>>>,
    read_only: ReadOnly,
}

impl Default for DeferredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            kind: Kind::from_static(DeferredPermission::KIND),
            groups: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }

    /// Type names that still have unresolved entries.
    pub fn pending_types(&self) -> Vec<String> {
        self.groups
            .read()
            .iter()
            .filter(|(_, entries)| entries.iter().any(|entry| is_unresolved(entry)))
            .map(|(type_name, _)| type_name.clone())
            .collect()
    }

    /// Snapshot of every entry declared for `type_name`.
    pub fn group(&self, type_name: &str) -> Vec<Arc<dyn Permission>> {
        self.groups
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the unresolved entries declared for `type_name`.
    pub fn pending(&self, type_name: &str) -> Vec<Arc<dyn Permission>> {
        self.group(type_name)
            .into_iter()
            .filter(|entry| is_unresolved(entry))
            .collect()
    }

    /// Snapshot of every group, keyed by type name.
    pub fn groups(&self) -> BTreeMap<String, Vec<Arc<dyn Permission>>> {
        self.groups.read().clone()
    }

    /// Remove the given entries from the `type_name` group.
    pub(crate) fn remove(&self, type_name: &str, settled: &[Arc<dyn Permission>]) {
        let mut groups = self.groups.write();
        if let Some(entries) = groups.get_mut(type_name) {
            entries.retain(|entry| !settled.iter().any(|done| Arc::ptr_eq(entry, done)));
            if entries.is_empty() {
                groups.remove(type_name);
            }
        }
    }
}

fn is_unresolved(entry: &Arc<dyn Permission>) -> bool {
    entry
        .downcast_ref::<DeferredPermission>()
        .is_some_and(|deferred| deferred.settled.get().is_none())
}

impl PermissionStore for DeferredStore {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        let type_name = expect_type::<DeferredPermission>(&self.kind, &*permission)?
            .type_name
            .clone();
        self.read_only.check()?;
        self.groups
            .write()
            .entry(type_name)
            .or_default()
            .push(permission);
        Ok(())
    }

    /// Every resolved entry is asked in turn, whatever name its type was
    /// declared under; unresolved entries never imply anything.
    fn implies(&self, requested: &dyn Permission) -> bool {
        let kind = requested.kind();
        self.groups.read().values().flatten().any(|entry| {
            entry
                .downcast_ref::<DeferredPermission>()
                .and_then(DeferredPermission::resolved)
                .is_some_and(|resolved| resolved.kind() == kind && resolved.implies(requested))
        })
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
        self.groups
            .read()
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }

    fn len(&self) -> usize {
        self.groups.read().values().map(Vec::len).sum()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deferred(type_name: &str, name: &str, actions: Option<&str>) -> DeferredPermission {
        DeferredPermission::new(type_name, name, actions.map(String::from), None).unwrap()
    }

    fn file(path: &str, actions: &str) -> FilePermission {
        FilePermission::new(path, actions).unwrap()
    }

    #[test]
    fn it_requires_a_type_name() {
        assert!(DeferredPermission::new("", "x", None, None).is_err());
    }

    #[test]
    fn it_implies_nothing_until_resolved() {
        let permission = deferred("file", "/tmp/-", Some("read"));
        assert!(permission.resolution().is_unresolved());
        assert!(!permission.implies(&file("/tmp/a", "read")));
        assert!(!permission.implies(&AllPermission));
    }

    #[test]
    fn it_stays_unresolved_when_the_type_is_unavailable() {
        let permission = deferred("file", "/tmp/-", Some("read"));
        let empty = Catalog::new();

        let result = permission.resolve(&empty, &AcceptAll);
        assert_eq!(result.err(), Some(DialogPermissionError::TypeUnavailable("file".into())));
        assert!(permission.resolution().is_unresolved());

        let resolved = permission.resolve(&Catalog::standard(), &AcceptAll).unwrap();
        assert!(resolved.implies(&file("/tmp/a", "read")));
        assert!(permission.implies(&file("/tmp/a", "read")));
        assert!(!permission.implies(&file("/tmp/a", "write")));
    }

    #[test]
    fn it_fails_permanently_on_signer_mismatch() {
        let permission = DeferredPermission::new(
            "file",
            "/tmp/-",
            Some("read".into()),
            Some(vec![Signer::new("mallory")]),
        )
        .unwrap();
        let trusted = TrustedSigners::new();
        trusted.vouch("file", "alice");

        let result = permission.resolve(&Catalog::standard(), &trusted);
        assert!(matches!(
            result,
            Err(DialogPermissionError::SignerMismatch { .. })
        ));

        trusted.vouch("file", "mallory");
        let loads = AtomicUsize::new(0);
        let counting = |type_name: &str| {
            loads.fetch_add(1, Ordering::SeqCst);
            Catalog::standard().load(type_name)
        };
        let again = permission.resolve(&counting, &trusted);
        assert!(matches!(
            again,
            Err(DialogPermissionError::SignerMismatch { .. })
        ));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(matches!(permission.resolution(), Resolution::Failed(_)));
        assert!(!permission.implies(&file("/tmp/a", "read")));
    }

    #[test]
    fn it_accepts_trusted_signers() {
        let permission = DeferredPermission::new(
            "file",
            "/tmp/-",
            Some("read".into()),
            Some(vec![Signer::new("alice")]),
        )
        .unwrap();
        let trusted = TrustedSigners::new();
        trusted.vouch("file", "alice");

        assert!(permission.resolve(&Catalog::standard(), &trusted).is_ok());
        assert!(permission.implies(&file("/tmp/a", "read")));
    }

    #[test]
    fn it_fails_permanently_on_invalid_parts() {
        let permission = deferred("file", "/tmp/a", Some("fly"));
        let result = permission.resolve(&Catalog::standard(), &AcceptAll);
        assert!(matches!(
            result,
            Err(DialogPermissionError::InvalidPermission { .. })
        ));
        assert!(matches!(permission.resolution(), Resolution::Failed(_)));
    }

    #[test]
    fn it_returns_the_cached_permission() {
        let permission = deferred("runtime", "exit", None);
        let catalog = Catalog::new();
        catalog.register_named("runtime");

        let first = permission.resolve(&catalog, &AcceptAll).unwrap();
        catalog.unregister("runtime");
        let second = permission.resolve(&catalog, &AcceptAll).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn it_compares_declared_type_and_signers() {
        let one = deferred("file", "/tmp/a", Some("read")).into_shared();
        let two = deferred("file", "/tmp/a", Some("read")).into_shared();
        let other_type = deferred("socket", "/tmp/a", Some("read")).into_shared();
        let signed = DeferredPermission::new("file", "/tmp/a", Some("read".into()), Some(vec![]))
            .unwrap()
            .into_shared();

        assert!(*one == *two);
        assert!(*one != *other_type);
        assert!(*one != *signed);
    }

    #[test]
    fn it_groups_entries_by_type_name() {
        let store = DeferredStore::new();
        store.add(deferred("file", "/a", Some("read")).into_shared()).unwrap();
        store.add(deferred("file", "/b", Some("read")).into_shared()).unwrap();
        store.add(deferred("socket", "localhost", Some("listen")).into_shared()).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.group("file").len(), 2);
        assert_eq!(store.pending_types(), vec!["file".to_string(), "socket".to_string()]);
        assert!(store.add(AllPermission.into_shared()).is_err());
    }

    #[test]
    fn it_delegates_to_resolved_entries_of_the_requested_kind() {
        let store = DeferredStore::new();
        let entry = deferred("file", "/tmp/-", Some("read"));
        entry.resolve(&Catalog::standard(), &AcceptAll).unwrap();
        store.add(entry.into_shared()).unwrap();
        store.add(deferred("file", "/var/-", Some("read")).into_shared()).unwrap();

        assert!(store.implies(&file("/tmp/a", "read")));
        assert!(!store.implies(&file("/var/a", "read")));
        assert_eq!(store.pending_types(), vec!["file".to_string()]);
        assert_eq!(store.pending("file").len(), 1);
    }

    #[test]
    fn it_delegates_to_entries_declared_under_an_alias() {
        let catalog = Catalog::new();
        catalog.register_factory("java.io.FilePermission", TypeFactory::<FilePermission>::new());

        let store = DeferredStore::new();
        let entry = deferred("java.io.FilePermission", "/tmp/-", Some("read"));
        entry.resolve(&catalog, &AcceptAll).unwrap();
        store.add(entry.into_shared()).unwrap();

        assert!(store.implies(&file("/tmp/a", "read")));
        assert!(!store.implies(&file("/tmp/a", "write")));
        assert!(!store.implies(&NamedPermission::new("runtime", "exit").unwrap()));
    }
}

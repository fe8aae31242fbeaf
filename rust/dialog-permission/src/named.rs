use crate::{
    AllPermission, DeferredPermission, DialogPermissionError, Elements, FilePermission, Kind,
    Permission, PermissionStore, PermissionType, ReadOnly, SocketPermission, store::expect_type,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A permission identified only by a hierarchical, dot-separated name.
///
/// The kind is chosen by the caller, which makes this the building block for
/// arbitrary named capabilities (`("runtime", "exit")`,
/// `("FileRead", "/tmp/a")`, ...). Names match exactly unless they are
/// wildcards: `*` matches every name of the same kind and `a.b.*` matches
/// every name starting with `a.b.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "NamedRecord", into = "NamedRecord")]
pub struct NamedPermission {
    kind: Kind,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct NamedRecord {
    kind: Kind,
    name: String,
}

impl TryFrom<NamedRecord> for NamedPermission {
    type Error = DialogPermissionError;

    fn try_from(record: NamedRecord) -> Result<Self, Self::Error> {
        Self::new(record.kind, record.name)
    }
}

impl From<NamedPermission> for NamedRecord {
    fn from(permission: NamedPermission) -> Self {
        Self {
            kind: permission.kind,
            name: permission.name,
        }
    }
}

impl NamedPermission {
    /// Kinds owned by the built-in permission types. Named permissions cannot
    /// take them, so they never claim those types' stores.
    pub const RESERVED_KINDS: [&'static str; 4] = [
        AllPermission::KIND,
        FilePermission::KIND,
        SocketPermission::KIND,
        DeferredPermission::KIND,
    ];

    /// Create a named permission of the given kind.
    ///
    /// The name must not be empty, and `*` may only appear as the whole name
    /// or as a trailing `.*` segment.
    pub fn new(kind: impl Into<Kind>, name: impl Into<String>) -> Result<Self, DialogPermissionError> {
        let kind = kind.into();
        let name = name.into();

        if kind.as_str().is_empty() {
            return Err(DialogPermissionError::invalid(kind, "kind must not be empty"));
        }
        if Self::RESERVED_KINDS.iter().any(|reserved| *reserved == kind.as_str()) {
            return Err(DialogPermissionError::invalid(
                kind.clone(),
                format!("'{kind}' is reserved for a built-in permission type"),
            ));
        }
        if name.is_empty() {
            return Err(DialogPermissionError::invalid(kind, "name must not be empty"));
        }
        let stars = name.matches('*').count();
        let well_formed = match stars {
            0 => true,
            1 => name == "*" || name.ends_with(".*"),
            _ => false,
        };
        if !well_formed {
            return Err(DialogPermissionError::invalid(
                kind,
                format!("'{name}' may only use '*' as a trailing wildcard segment"),
            ));
        }

        Ok(Self { kind, name })
    }

    /// Whether the name ends in a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.name.ends_with('*')
    }

    /// For wildcards, the name without its trailing `*` (so `a.b.*` yields
    /// `a.b.` and `*` yields the empty string).
    fn prefix(&self) -> &str {
        self.name.strip_suffix('*').unwrap_or(&self.name)
    }

    fn covers(&self, requested: &NamedPermission) -> bool {
        match (self.is_wildcard(), requested.is_wildcard()) {
            (true, true) => requested.prefix().starts_with(self.prefix()),
            (true, false) => requested.name.starts_with(self.prefix()),
            (false, true) => false,
            (false, false) => self.name == requested.name,
        }
    }
}

impl Permission for NamedPermission {
    fn kind(&self) -> Kind {
        self.kind.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        match requested.downcast_ref::<NamedPermission>() {
            Some(requested) => requested.kind == self.kind && self.covers(requested),
            None => false,
        }
    }

    fn new_store(&self) -> Option<Box<dyn PermissionStore>> {
        Some(Box::new(NamedStore::new(self.kind.clone())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct NamedEntries {
    permissions: Vec<Arc<dyn Permission>>,
    names: HashSet<String>,
}

/// Store for [`NamedPermission`]s of one kind.
///
/// Instead of asking every member, it looks the requested name up directly
/// and then looks up each enclosing wildcard (`a.b.c` → `a.b.*` → `a.*` →
/// `*`).
#[derive(Debug)]
pub struct NamedStore {
    kind: Kind,
    entries: RwLock<NamedEntries>,
    read_only: ReadOnly,
}

impl NamedStore {
    /// Create an empty store for named permissions of `kind`.
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: kind.into(),
            entries: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }
}

impl PermissionStore for NamedStore {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        let name = expect_type::<NamedPermission>(&self.kind, &*permission)?
            .name
            .clone();
        self.read_only.check()?;

        let mut entries = self.entries.write();
        entries.names.insert(name);
        entries.permissions.push(permission);
        Ok(())
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        let Some(requested) = requested.downcast_ref::<NamedPermission>() else {
            return false;
        };
        if requested.kind != self.kind {
            return false;
        }

        let entries = self.entries.read();
        if entries.names.contains("*") || entries.names.contains(&requested.name) {
            return true;
        }

        let mut path = requested
            .name
            .strip_suffix(".*")
            .unwrap_or(&requested.name);
        while let Some(offset) = path.rfind('.') {
            path = &path[..offset];
            if entries.names.contains(&format!("{path}.*")) {
                return true;
            }
        }
        false
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
        self.entries.read().permissions.clone().into()
    }

    fn len(&self) -> usize {
        self.entries.read().permissions.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn named(name: &str) -> NamedPermission {
        NamedPermission::new("runtime", name).unwrap()
    }

    #[test]
    fn it_validates_names() {
        assert!(NamedPermission::new("runtime", "").is_err());
        assert!(NamedPermission::new("", "exit").is_err());
        assert!(NamedPermission::new("runtime", "a*").is_err());
        assert!(NamedPermission::new("runtime", "a.*.b").is_err());
        assert!(NamedPermission::new("runtime", "*.*").is_err());
        assert!(NamedPermission::new("runtime", "*").is_ok());
        assert!(NamedPermission::new("runtime", "a.b.*").is_ok());
    }

    #[test]
    fn it_refuses_built_in_kinds() {
        for kind in NamedPermission::RESERVED_KINDS {
            assert!(matches!(
                NamedPermission::new(kind, "x"),
                Err(DialogPermissionError::InvalidPermission { .. })
            ));
        }
        let catalog = Catalog::new();
        catalog.register_named("file");
        assert!(catalog.load("file").unwrap().construct("/tmp/a", None).is_err());
    }

    #[test]
    fn it_matches_exact_names() {
        assert!(named("exit").implies(&named("exit")));
        assert!(!named("exit").implies(&named("exit.now")));
        assert!(!named("exit").implies(&named("*")));
    }

    #[test]
    fn it_matches_wildcards_by_prefix() {
        assert!(named("*").implies(&named("anything.at.all")));
        assert!(named("a.b.*").implies(&named("a.b.c")));
        assert!(named("a.b.*").implies(&named("a.b.c.d")));
        assert!(named("a.b.*").implies(&named("a.b.c.*")));
        assert!(named("a.*").implies(&named("a.b.*")));
        assert!(!named("a.b.*").implies(&named("a.b")));
        assert!(!named("a.b.*").implies(&named("a.*")));
        assert!(!named("a.*").implies(&named("*")));
    }

    #[test]
    fn it_never_matches_another_kind() {
        let property = NamedPermission::new("property", "exit").unwrap();
        assert!(!named("*").implies(&property));
        assert!(!named("exit").implies(&FilePermission::new("exit", "read").unwrap()));
    }

    #[test]
    fn it_walks_wildcards_in_the_store() {
        let store = NamedStore::new("runtime");
        store.add(named("a.b.*").into_shared()).unwrap();
        store.add(named("exit").into_shared()).unwrap();

        assert!(store.implies(&named("exit")));
        assert!(store.implies(&named("a.b.c")));
        assert!(store.implies(&named("a.b.c.d")));
        assert!(store.implies(&named("a.b.c.*")));
        assert!(store.implies(&named("a.b.*")));
        assert!(!store.implies(&named("a.c")));
        assert!(!store.implies(&named("a.*")));
        assert!(!store.implies(&NamedPermission::new("property", "exit").unwrap()));
    }

    #[test]
    fn it_honors_a_global_wildcard_in_the_store() {
        let store = NamedStore::new("runtime");
        store.add(named("*").into_shared()).unwrap();

        assert!(store.implies(&named("x.y.z")));
        assert!(store.implies(&named("*")));
    }

    #[test]
    fn it_rejects_named_permissions_of_another_kind() {
        let store = NamedStore::new("runtime");
        let result = store.add(NamedPermission::new("property", "exit").unwrap().into_shared());
        assert!(matches!(
            result,
            Err(DialogPermissionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn it_round_trips_through_serde() {
        let permission = named("a.b.*");
        let json = serde_json::to_string(&permission).unwrap();
        assert_eq!(json, r#"{"kind":"runtime","name":"a.b.*"}"#);

        let parsed: NamedPermission = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, permission);
        assert!(serde_json::from_str::<NamedPermission>(r#"{"kind":"runtime","name":""}"#).is_err());
    }
}

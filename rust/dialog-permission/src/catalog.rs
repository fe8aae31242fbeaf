//! Loading permission types by name.
//!
//! A [`DeferredPermission`](crate::DeferredPermission) only knows the name of
//! its type. Binding it requires a [`TypeLoader`] that can find a
//! [`PermissionFactory`] for that name. [`Catalog`] is the stock loader: a
//! registry that new permission types can be added to at any time, from any
//! thread.

use crate::{
    AllPermission, DialogPermissionError, FilePermission, Kind, NamedPermission, Permission,
    PermissionType, SocketPermission,
};
use dashmap::DashMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Builds permissions of one type from their persisted parts.
pub trait PermissionFactory: Send + Sync {
    /// Kind of the permissions this factory builds.
    fn kind(&self) -> Kind;

    /// Build a permission, validating `name` and `actions`.
    fn construct(
        &self,
        name: &str,
        actions: Option<&str>,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError>;
}

/// Finds the factory for a permission type name.
pub trait TypeLoader: Send + Sync {
    /// The factory for `type_name`, or `None` if the type is not available
    /// (yet).
    fn load(&self, type_name: &str) -> Option<Arc<dyn PermissionFactory>>;
}

impl<F> TypeLoader for F
where
    F: Fn(&str) -> Option<Arc<dyn PermissionFactory>> + Send + Sync,
{
    fn load(&self, type_name: &str) -> Option<Arc<dyn PermissionFactory>> {
        self(type_name)
    }
}

/// Factory for a [`PermissionType`].
pub struct TypeFactory<P>(PhantomData<fn() -> P>);

impl<P> TypeFactory<P> {
    /// Create the factory.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<P> Default for TypeFactory<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PermissionType> PermissionFactory for TypeFactory<P> {
    fn kind(&self) -> Kind {
        Kind::from_static(P::KIND)
    }

    fn construct(
        &self,
        name: &str,
        actions: Option<&str>,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        Ok(P::construct(name, actions)?.into_shared())
    }
}

/// Factory for [`NamedPermission`]s of one kind. Actions are ignored.
#[derive(Debug, Clone)]
pub struct NamedFactory(Kind);

impl NamedFactory {
    /// Create a factory for named permissions of `kind`.
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self(kind.into())
    }
}

impl PermissionFactory for NamedFactory {
    fn kind(&self) -> Kind {
        self.0.clone()
    }

    fn construct(
        &self,
        name: &str,
        _actions: Option<&str>,
    ) -> Result<Arc<dyn Permission>, DialogPermissionError> {
        Ok(NamedPermission::new(self.0.clone(), name)?.into_shared())
    }
}

/// Registry of permission types, keyed by type name.
#[derive(Default)]
pub struct Catalog {
    factories: DashMap<String, Arc<dyn PermissionFactory>>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the built-in `all`, `file` and `socket` types.
    pub fn standard() -> Self {
        let catalog = Self::new();
        catalog.register::<AllPermission>();
        catalog.register::<FilePermission>();
        catalog.register::<SocketPermission>();
        catalog
    }

    /// Make `P` available under its kind.
    pub fn register<P: PermissionType>(&self) {
        self.register_factory(P::KIND, TypeFactory::<P>::new());
    }

    /// Make named permissions of `kind` available under the kind's name.
    pub fn register_named(&self, kind: impl Into<Kind>) {
        let kind = kind.into();
        self.register_factory(kind.to_string(), NamedFactory::new(kind));
    }

    /// Make `factory` available under `type_name`, replacing any previous
    /// registration.
    pub fn register_factory(
        &self,
        type_name: impl Into<String>,
        factory: impl PermissionFactory + 'static,
    ) {
        let type_name = type_name.into();
        debug!(%type_name, "Registered permission type");
        self.factories.insert(type_name, Arc::new(factory));
    }

    /// Remove the registration for `type_name`.
    pub fn unregister(&self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }

    /// Whether `type_name` is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        f.debug_struct("Catalog").field("types", &names).finish()
    }
}

impl TypeLoader for Catalog {
    fn load(&self, type_name: &str) -> Option<Arc<dyn PermissionFactory>> {
        self.factories
            .get(type_name)
            .map(|factory| factory.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn it_loads_standard_types() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.len(), 3);

        let factory = catalog.load("file").unwrap();
        assert_eq!(factory.kind(), "file");

        let permission = factory.construct("/tmp/a", Some("read")).unwrap();
        assert!(permission.implies(&FilePermission::new("/tmp/a", "read").unwrap()));
        assert!(catalog.load("runtime").is_none());
    }

    #[test]
    fn it_registers_named_kinds() {
        let catalog = Catalog::new();
        catalog.register_named("runtime");

        let permission = catalog
            .load("runtime")
            .unwrap()
            .construct("exit", None)
            .unwrap();
        assert_eq!(permission.kind(), "runtime");
        assert_eq!(permission.name(), "exit");
    }

    #[test]
    fn it_reports_construction_failures() {
        let catalog = Catalog::standard();
        let result = catalog.load("file").unwrap().construct("/tmp/a", Some("fly"));
        assert!(matches!(
            result,
            Err(DialogPermissionError::InvalidPermission { .. })
        ));
    }

    #[test]
    fn it_unregisters_types() {
        let catalog = Catalog::standard();
        assert!(catalog.unregister("socket"));
        assert!(!catalog.unregister("socket"));
        assert!(!catalog.contains("socket"));
        assert_eq!(format!("{catalog:?}"), r#"Catalog { types: ["all", "file"] }"#);
    }
}

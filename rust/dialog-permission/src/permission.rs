use crate::{DialogPermissionError, Kind, PermissionStore};
use std::any::{Any, TypeId};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An immutable grant of authority over a named resource.
///
/// A permission is identified by its [`Kind`], its name and an optional
/// canonical action string. Each concrete type decides how it matches a
/// requested permission through [`Permission::implies`], and may provide a
/// store specialized for that test through [`Permission::new_store`].
///
/// Permissions are shared as `Arc<dyn Permission>`; equality and hashing of
/// `dyn Permission` are defined over `(kind, name, actions)`, so concrete
/// types must report actions in a canonical form (sorted, deduplicated).
pub trait Permission: Debug + Send + Sync + 'static {
    /// Identity of the concrete type of this permission.
    fn kind(&self) -> Kind;

    /// The resource name this permission applies to.
    fn name(&self) -> &str;

    /// Canonical action string, if the type has actions.
    fn actions(&self) -> Option<&str> {
        None
    }

    /// Whether holding this permission authorizes `requested`.
    fn implies(&self, requested: &dyn Permission) -> bool;

    /// Creates an empty store optimized for permissions of this type.
    ///
    /// Returning `None` (the default) makes collections fall back to a
    /// [`GenericStore`](crate::GenericStore).
    fn new_store(&self) -> Option<Box<dyn PermissionStore>> {
        None
    }

    /// Access to the concrete type, used by type-specific implication.
    fn as_any(&self) -> &dyn Any;

    /// Whether this permission is equal to `other`.
    ///
    /// The default compares kind, name and actions. Types carrying more
    /// identity may make this stricter, never looser, so that equal values
    /// keep hashing equally.
    fn same_as(&self, other: &dyn Permission) -> bool {
        self.kind() == other.kind()
            && self.name() == other.name()
            && self.actions() == other.actions()
    }

    /// Move this permission behind a shared pointer.
    fn into_shared(self) -> Arc<dyn Permission>
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// A permission type with a static kind that can be built from a name and
/// actions, which is what deferred permissions need to be bound to it.
pub trait PermissionType: Permission + Sized {
    /// The kind shared by all values of this type.
    const KIND: &'static str;

    /// Build a permission from its persisted parts, validating them.
    fn construct(name: &str, actions: Option<&str>) -> Result<Self, DialogPermissionError>;
}

impl dyn Permission {
    /// Downcast to a concrete permission type.
    pub fn downcast_ref<P: Permission>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    /// Whether this permission is of concrete type `P`.
    pub fn is<P: Permission>(&self) -> bool {
        self.as_any().is::<P>()
    }

    /// Identity of the concrete type behind this trait object.
    pub fn concrete_type(&self) -> TypeId {
        Any::type_id(self.as_any())
    }
}

impl PartialEq for dyn Permission {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) && other.same_as(self)
    }
}

impl Eq for dyn Permission {}

impl Hash for dyn Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.name().hash(state);
        self.actions().hash(state);
    }
}

impl Display for dyn Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.actions() {
            Some(actions) => write!(f, "({} \"{}\" \"{}\")", self.kind(), self.name(), actions),
            None => write!(f, "({} \"{}\")", self.kind(), self.name()),
        }
    }
}

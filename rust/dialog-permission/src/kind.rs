use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt::{Display, Formatter};

/// Identity of a concrete permission type.
///
/// Every permission reports its kind and every store is declared for exactly
/// one kind. Built-in types use static names (`"file"`, `"socket"`, ...)
/// while [`NamedPermission`](crate::NamedPermission) lets callers pick kinds
/// at runtime, so the identity is a string rather than a Rust type id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// A kind backed by a static name.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Name of this kind.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Kind {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&Kind> for Kind {
    fn from(value: &Kind) -> Self {
        value.clone()
    }
}

impl Borrow<str> for Kind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Kind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Kind {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Kind {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

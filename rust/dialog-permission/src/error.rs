use crate::{Kind, Signer};
use thiserror::Error;

/// Returned by a [`Guard`](crate::Guard) when it refuses access to the
/// payload it protects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Access denied: {reason}")]
pub struct AccessDenied {
    /// Why the guard refused access.
    pub reason: String,
}

impl AccessDenied {
    /// Create a denial with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogPermissionError {
    /// A permission was added to a store declared for a different kind, or
    /// for another concrete type of the same kind.
    #[error("Type mismatch: store for '{expected}' permissions cannot hold this '{found}' permission")]
    TypeMismatch {
        /// The kind the store was created for.
        expected: Kind,
        /// The kind of the rejected permission.
        found: Kind,
    },

    /// A store or permission set was mutated after it was frozen.
    #[error("Attempted to add a permission to a read-only collection")]
    ReadOnly,

    /// No permission type is known for a deferred permission's declared type
    /// name. Resolution may succeed later once the type is registered.
    #[error("Permission type '{0}' is not available")]
    TypeUnavailable(String),

    /// The signers named by a deferred permission are not trusted for its
    /// type. This is permanent for that deferred permission.
    #[error("Signers {signers:?} are not trusted for permission type '{type_name}'")]
    SignerMismatch {
        /// Declared type name of the deferred permission.
        type_name: String,
        /// Signers the deferred permission requires.
        signers: Vec<Signer>,
    },

    /// A permission could not be constructed from the given name or actions.
    #[error("Invalid '{kind}' permission: {reason}")]
    InvalidPermission {
        /// Kind of the permission that failed validation.
        kind: Kind,
        /// Description of the problem.
        reason: String,
    },

    /// The persisted layout of deferred permissions was malformed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A guard refused access.
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
}

impl DialogPermissionError {
    /// Shorthand for an [`DialogPermissionError::InvalidPermission`].
    pub fn invalid(kind: impl Into<Kind>, reason: impl Into<String>) -> Self {
        Self::InvalidPermission {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the failed operation later could succeed.
    ///
    /// Only [`DialogPermissionError::TypeUnavailable`] is recoverable; every
    /// other variant reports a caller bug or a permanent decision.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TypeUnavailable(_))
    }
}

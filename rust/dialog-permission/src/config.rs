use crate::DialogPermissionError;
use serde::{Deserialize, Serialize};

/// How far an [`AllPermission`](crate::AllPermission) reaches inside a
/// [`Permissions`](crate::Permissions) set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniversalScope {
    /// Holding `AllPermission` implies every request, whatever its kind.
    #[default]
    Aggregate,
    /// `AllPermission` only answers requests routed to its own kind; every
    /// other kind is decided by its own store.
    Kind,
}

/// Settings for a [`Permissions`](crate::Permissions) set.
///
/// ```
/// use dialog_permission::{PermissionsConfig, UniversalScope};
///
/// let config = PermissionsConfig::from_json(r#"{ "universal": "kind" }"#).unwrap();
/// assert_eq!(config.universal, UniversalScope::Kind);
///
/// let config = PermissionsConfig::from_json("{}").unwrap();
/// assert_eq!(config.universal, UniversalScope::Aggregate);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PermissionsConfig {
    /// Reach of the universal permission.
    pub universal: UniversalScope,
}

impl PermissionsConfig {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, DialogPermissionError> {
        serde_json::from_str(json).map_err(|error| DialogPermissionError::Serialization(error.to_string()))
    }
}

//! The flat persisted layout of deferred permissions.
//!
//! Older stores persisted their deferred permissions as a map from declared
//! type name to the list of records of that type:
//!
//! ```json
//! {
//!   "file": [{ "type": "file", "name": "/tmp/-", "actions": "read" }],
//!   "runtime": [{ "type": "runtime", "name": "exit" }]
//! }
//! ```
//!
//! [`DeferredStore`] reads and writes exactly this shape, so persisted data
//! stays compatible with it.

use crate::{
    DeferredPermission, DeferredStore, DialogPermissionError, Permission, PermissionStore, Signer,
};
use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Persisted form of one [`DeferredPermission`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeferredRecord {
    /// Declared type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource name.
    pub name: String,
    /// Action string, if the type has actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<String>,
    /// Signers that must vouch for the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<Signer>>,
}

/// Deferred permissions grouped by declared type name.
pub type LegacyLayout = BTreeMap<String, Vec<DeferredRecord>>;

impl DeferredPermission {
    /// The persisted form of this permission.
    pub fn record(&self) -> DeferredRecord {
        DeferredRecord {
            type_name: self.type_name().into(),
            name: self.name().into(),
            actions: self.actions().map(String::from),
            signers: self.signers().map(<[Signer]>::to_vec),
        }
    }
}

impl TryFrom<DeferredRecord> for DeferredPermission {
    type Error = DialogPermissionError;

    fn try_from(record: DeferredRecord) -> Result<Self, Self::Error> {
        DeferredPermission::new(record.type_name, record.name, record.actions, record.signers)
    }
}

/// Convert the entries of `store` to the legacy layout.
///
/// Only the declared parts are kept; whether an entry was resolved is not
/// persisted.
pub fn flatten(store: &DeferredStore) -> LegacyLayout {
    store
        .groups()
        .into_iter()
        .map(|(type_name, entries)| {
            let records = entries
                .iter()
                .filter_map(|entry| entry.downcast_ref::<DeferredPermission>())
                .map(DeferredPermission::record)
                .collect();
            (type_name, records)
        })
        .collect()
}

/// Rebuild a [`DeferredStore`] from the legacy layout.
///
/// Every record must be filed under its own type name. Empty groups are
/// dropped.
pub fn unflatten(layout: LegacyLayout) -> Result<DeferredStore, DialogPermissionError> {
    let store = DeferredStore::new();
    for (type_name, records) in layout {
        for record in records {
            if record.type_name != type_name {
                return Err(DialogPermissionError::Serialization(format!(
                    "record of type '{}' filed under '{type_name}'",
                    record.type_name
                )));
            }
            let permission = DeferredPermission::try_from(record)?;
            store.add(permission.into_shared())?;
        }
    }
    Ok(store)
}

impl Serialize for DeferredStore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        flatten(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeferredStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let layout = LegacyLayout::deserialize(deserializer)?;
        unflatten(layout).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn record(type_name: &str, name: &str, actions: Option<&str>) -> DeferredRecord {
        DeferredRecord {
            type_name: type_name.into(),
            name: name.into(),
            actions: actions.map(String::from),
            signers: None,
        }
    }

    #[test]
    fn it_flattens_groups_by_type_name() -> TestResult {
        let store = DeferredStore::new();
        store.add(DeferredPermission::try_from(record("file", "/tmp/-", Some("read")))?.into_shared())?;
        store.add(DeferredPermission::try_from(record("runtime", "exit", None))?.into_shared())?;
        store.add(DeferredPermission::try_from(record("file", "/var/-", Some("write")))?.into_shared())?;

        let layout = flatten(&store);
        assert_eq!(
            layout,
            LegacyLayout::from([
                (
                    "file".to_string(),
                    vec![
                        record("file", "/tmp/-", Some("read")),
                        record("file", "/var/-", Some("write")),
                    ]
                ),
                ("runtime".to_string(), vec![record("runtime", "exit", None)]),
            ])
        );
        Ok(())
    }

    #[test]
    fn it_reads_the_persisted_shape() -> TestResult {
        let json = r#"{
            "file": [{ "type": "file", "name": "/tmp/-", "actions": "read" }],
            "runtime": [{ "type": "runtime", "name": "exit", "signers": ["alice"] }],
            "socket": []
        }"#;
        let store: DeferredStore = serde_json::from_str(json)?;

        assert_eq!(store.len(), 2);
        assert_eq!(store.pending_types(), vec!["file".to_string(), "runtime".to_string()]);
        let runtime = store.group("runtime");
        let runtime = runtime[0]
            .downcast_ref::<DeferredPermission>()
            .expect("entries are deferred permissions");
        assert_eq!(runtime.signers(), Some(&[Signer::new("alice")][..]));
        Ok(())
    }

    #[test]
    fn it_rejects_records_filed_under_another_type() {
        let layout = LegacyLayout::from([(
            "socket".to_string(),
            vec![record("file", "/tmp/a", Some("read"))],
        )]);
        assert!(matches!(
            unflatten(layout),
            Err(DialogPermissionError::Serialization(_))
        ));
    }

    #[test]
    fn it_rejects_records_without_a_type_name() {
        let layout = LegacyLayout::from([("".to_string(), vec![record("", "x", None)])]);
        assert!(matches!(
            unflatten(layout),
            Err(DialogPermissionError::InvalidPermission { .. })
        ));
    }

    #[test]
    fn it_omits_absent_fields() -> TestResult {
        let json = serde_json::to_string(&record("runtime", "exit", None))?;
        assert_eq!(json, r#"{"type":"runtime","name":"exit"}"#);
        Ok(())
    }
}

use crate::{
    DialogPermissionError, Elements, Kind, Permission, PermissionStore, PermissionType, ReadOnly,
    store::expect_type,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::debug;

/// Set of file actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileActions(u8);

impl FileActions {
    /// Read file contents.
    pub const READ: Self = Self(1);
    /// Write or create files.
    pub const WRITE: Self = Self(1 << 1);
    /// Execute files.
    pub const EXECUTE: Self = Self(1 << 2);
    /// Delete files.
    pub const DELETE: Self = Self(1 << 3);
    /// Read the target of a symbolic link.
    pub const READLINK: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::READ, "read"),
        (Self::WRITE, "write"),
        (Self::EXECUTE, "execute"),
        (Self::DELETE, "delete"),
        (Self::READLINK, "readlink"),
    ];

    /// Parse a comma-separated, case-insensitive action list.
    pub fn parse(actions: &str) -> Result<Self, DialogPermissionError> {
        let mut parsed = Self::default();
        for action in actions.split(',').map(str::trim) {
            let action = action.to_ascii_lowercase();
            match Self::NAMES.iter().find(|(_, name)| *name == action) {
                Some((flag, _)) => parsed = parsed.union(*flag),
                None => {
                    return Err(DialogPermissionError::invalid(
                        FilePermission::KIND,
                        format!("unknown action '{action}'"),
                    ));
                }
            }
        }
        Ok(parsed)
    }

    /// Actions present in either set.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every action of `other` is present in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no action is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Display for FileActions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// What part of the file system a path pattern covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    /// `<<ALL FILES>>`
    Everything,
    /// A single file or directory.
    Exact(String),
    /// Entries directly inside a directory (`/dir/*`, or `*` for the current
    /// directory). Holds the directory with its trailing separator.
    Children(String),
    /// Entries anywhere below a directory (`/dir/-`, or `-`).
    Descendants(String),
}

impl Target {
    fn parse(path: &str) -> Self {
        if path == FilePermission::ALL_FILES {
            Self::Everything
        } else if path == "*" {
            Self::Children(String::new())
        } else if path == "-" {
            Self::Descendants(String::new())
        } else if let Some(directory) = path.strip_suffix('*').filter(|d| d.ends_with('/')) {
            Self::Children(directory.into())
        } else if let Some(directory) = path.strip_suffix('-').filter(|d| d.ends_with('/')) {
            Self::Descendants(directory.into())
        } else {
            Self::Exact(path.into())
        }
    }

    /// Whether `path` lies under `directory`. The empty directory stands for
    /// the current directory, which only holds relative paths.
    fn within<'a>(directory: &str, path: &'a str) -> Option<&'a str> {
        if directory.is_empty() && path.starts_with('/') {
            return None;
        }
        path.strip_prefix(directory).filter(|rest| !rest.is_empty())
    }

    fn covers(&self, requested: &Target) -> bool {
        match (self, requested) {
            (Self::Everything, _) => true,
            (_, Self::Everything) => false,
            (Self::Exact(granted), Self::Exact(path)) => granted == path,
            (Self::Exact(_), _) => false,
            (Self::Children(directory), Self::Exact(path)) => {
                Self::within(directory, path).is_some_and(|rest| !rest.contains('/'))
            }
            (Self::Children(directory), Self::Children(other)) => directory == other,
            (Self::Children(_), Self::Descendants(_)) => false,
            (Self::Descendants(directory), Self::Exact(path)) => {
                Self::within(directory, path).is_some()
            }
            (Self::Descendants(directory), Self::Children(other) | Self::Descendants(other)) => {
                directory == other || Self::within(directory, other).is_some()
            }
        }
    }
}

/// Access to a file, a directory's entries, or a directory tree.
///
/// Path patterns:
///
/// | pattern          | covers                                   |
/// |------------------|------------------------------------------|
/// | `/tmp/a`         | exactly `/tmp/a`                         |
/// | `/tmp/*`         | entries directly inside `/tmp`           |
/// | `/tmp/-`         | everything below `/tmp`, recursively     |
/// | `*`, `-`         | the same for the current directory       |
/// | `<<ALL FILES>>`  | every file                               |
///
/// Paths are compared as given; no file system access or canonicalization
/// takes place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FileRecord", into = "FileRecord")]
pub struct FilePermission {
    path: String,
    target: Target,
    actions: FileActions,
    canonical_actions: String,
}

#[derive(Serialize, Deserialize)]
struct FileRecord {
    path: String,
    actions: String,
}

impl TryFrom<FileRecord> for FilePermission {
    type Error = DialogPermissionError;

    fn try_from(record: FileRecord) -> Result<Self, Self::Error> {
        Self::new(record.path, &record.actions)
    }
}

impl From<FilePermission> for FileRecord {
    fn from(permission: FilePermission) -> Self {
        Self {
            path: permission.path,
            actions: permission.canonical_actions,
        }
    }
}

impl FilePermission {
    /// Pattern covering every file.
    pub const ALL_FILES: &'static str = "<<ALL FILES>>";

    /// Create a file permission from a path pattern and a comma-separated
    /// list of `read`, `write`, `execute`, `delete` and `readlink`.
    pub fn new(path: impl Into<String>, actions: &str) -> Result<Self, DialogPermissionError> {
        let path = path.into();
        if path.is_empty() {
            return Err(DialogPermissionError::invalid(Self::KIND, "path must not be empty"));
        }
        let actions = FileActions::parse(actions)?;
        if actions.is_empty() {
            return Err(DialogPermissionError::invalid(Self::KIND, "no actions given"));
        }

        Ok(Self {
            target: Target::parse(&path),
            canonical_actions: actions.to_string(),
            path,
            actions,
        })
    }

    /// The path pattern as given.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The granted actions.
    pub fn file_actions(&self) -> FileActions {
        self.actions
    }

    /// Whether this permission's path pattern covers the requested one,
    /// regardless of actions.
    pub fn covers_path(&self, requested: &FilePermission) -> bool {
        self.target.covers(&requested.target)
    }
}

impl Permission for FilePermission {
    fn kind(&self) -> Kind {
        Kind::from_static(Self::KIND)
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn actions(&self) -> Option<&str> {
        Some(&self.canonical_actions)
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        match requested.downcast_ref::<FilePermission>() {
            Some(requested) => {
                self.actions.contains(requested.actions) && self.covers_path(requested)
            }
            None => false,
        }
    }

    fn new_store(&self) -> Option<Box<dyn PermissionStore>> {
        Some(Box::new(FileStore::new()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PermissionType for FilePermission {
    const KIND: &'static str = "file";

    fn construct(name: &str, actions: Option<&str>) -> Result<Self, DialogPermissionError> {
        let actions = actions
            .ok_or_else(|| DialogPermissionError::invalid(Self::KIND, "no actions given"))?;
        Self::new(name, actions)
    }
}

/// Store for [`FilePermission`]s.
///
/// Actions are combined across entries: granting `read` on `/tmp/-` and
/// `write` on `/tmp/a` implies `read,write` on `/tmp/a` even though no single
/// entry does.
#[derive(Debug)]
pub struct FileStore {
    kind: Kind,
    permissions: RwLock<Vec<Arc<dyn Permission>>>,
    read_only: ReadOnly,
}

impl FileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            kind: Kind::from_static(FilePermission::KIND),
            permissions: RwLock::default(),
            read_only: ReadOnly::default(),
        }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore for FileStore {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn add(&self, permission: Arc<dyn Permission>) -> Result<(), DialogPermissionError> {
        expect_type::<FilePermission>(&self.kind, &*permission)?;
        self.read_only.check()?;
        self.permissions.write().push(permission);
        Ok(())
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        let Some(requested) = requested.downcast_ref::<FilePermission>() else {
            return false;
        };

        let mut effective = FileActions::default();
        for granted in self.permissions.read().iter() {
            let Some(granted) = granted.downcast_ref::<FilePermission>() else {
                continue;
            };
            if granted.covers_path(requested) {
                effective = effective.union(granted.actions);
                if effective.contains(requested.actions) {
                    return true;
                }
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

    fn file(path: &str, actions: &str) -> FilePermission {
        FilePermission::new(path, actions).unwrap()
    }

    #[test]
    fn it_canonicalizes_actions() {
        assert_eq!(file("/a", " Write ,read,READ").actions(), Some("read,write"));
        assert_eq!(
            file("/a", "readlink,delete,execute,write,read").actions(),
            Some("read,write,execute,delete,readlink")
        );
    }

    #[test]
    fn it_rejects_bad_input() {
        assert!(FilePermission::new("", "read").is_err());
        assert!(FilePermission::new("/a", "").is_err());
        assert!(FilePermission::new("/a", "read,chmod").is_err());
        assert!(FilePermission::construct("/a", None).is_err());
    }

    #[test]
    fn it_matches_exact_paths() {
        assert!(file("/tmp/a", "read").implies(&file("/tmp/a", "read")));
        assert!(!file("/tmp/a", "read").implies(&file("/tmp/b", "read")));
        assert!(!file("/tmp/a", "read").implies(&file("/tmp/a", "write")));
        assert!(!file("/tmp", "read").implies(&file("/tmp/*", "read")));
    }

    #[test]
    fn it_matches_directory_children() {
        let granted = file("/tmp/*", "read,write");
        assert!(granted.implies(&file("/tmp/a", "read")));
        assert!(granted.implies(&file("/tmp/*", "write")));
        assert!(!granted.implies(&file("/tmp/a/b", "read")));
        assert!(!granted.implies(&file("/tmp", "read")));
        assert!(!granted.implies(&file("/tmp/-", "read")));
        assert!(!granted.implies(&file("/tmp/a", "execute")));
    }

    #[test]
    fn it_matches_directory_descendants() {
        let granted = file("/tmp/-", "read");
        assert!(granted.implies(&file("/tmp/a", "read")));
        assert!(granted.implies(&file("/tmp/a/b/c", "read")));
        assert!(granted.implies(&file("/tmp/a/*", "read")));
        assert!(granted.implies(&file("/tmp/*", "read")));
        assert!(granted.implies(&file("/tmp/a/-", "read")));
        assert!(!granted.implies(&file("/tmp", "read")));
        assert!(!granted.implies(&file("/var/a", "read")));
    }

    #[test]
    fn it_keeps_relative_patterns_relative() {
        assert!(file("*", "read").implies(&file("notes.txt", "read")));
        assert!(!file("*", "read").implies(&file("docs/notes.txt", "read")));
        assert!(!file("*", "read").implies(&file("/notes.txt", "read")));
        assert!(file("-", "read").implies(&file("docs/notes.txt", "read")));
        assert!(!file("-", "read").implies(&file("/etc/passwd", "read")));
    }

    #[test]
    fn it_matches_all_files() {
        let granted = file(FilePermission::ALL_FILES, "read");
        assert!(granted.implies(&file("/etc/passwd", "read")));
        assert!(granted.implies(&file("/-", "read")));
        assert!(granted.implies(&file(FilePermission::ALL_FILES, "read")));
        assert!(!file("/-", "read").implies(&file(FilePermission::ALL_FILES, "read")));
    }

    #[test]
    fn it_combines_actions_across_store_entries() {
        let store = FileStore::new();
        store.add(file("/tmp/-", "read").into_shared()).unwrap();
        store.add(file("/tmp/a", "write").into_shared()).unwrap();

        assert!(store.implies(&file("/tmp/a", "read,write")));
        assert!(!store.implies(&file("/tmp/b", "read,write")));
        assert!(store.implies(&file("/tmp/b", "read")));
    }

    #[test]
    fn it_round_trips_through_serde() {
        let permission = file("/tmp/*", "write,read");
        let json = serde_json::to_string(&permission).unwrap();
        assert_eq!(json, r#"{"path":"/tmp/*","actions":"read,write"}"#);
        assert_eq!(serde_json::from_str::<FilePermission>(&json).unwrap(), permission);
    }
}

#![warn(missing_docs)]

//! Capability-style permissions and access decisions.
//!
//! A [`Permission`] grants authority over a named resource, optionally
//! restricted to a set of actions, and decides for itself whether it
//! [implies](Permission::implies) another permission. Granted permissions
//! are collected in a [`Permissions`] set, which routes each of them to a
//! [`PermissionStore`] specialized for its [`Kind`] and answers access
//! decisions through [`implies`].
//!
//! ```rust
//! use dialog_permission::{FilePermission, Permission, Permissions, implies};
//!
//! let granted = Permissions::new();
//! granted.add(FilePermission::new("/srv/www/-", "read")?.into_shared())?;
//!
//! assert!(implies(&granted, &FilePermission::new("/srv/www/index.html", "read")?));
//! assert!(!implies(&granted, &FilePermission::new("/srv/www/index.html", "write")?));
//! # Ok::<(), dialog_permission::DialogPermissionError>(())
//! ```
//!
//! # Built-in permission types
//!
//! - [`AllPermission`] implies every permission.
//! - [`NamedPermission`] matches hierarchical names such as `exit` or
//!   `os.*`.
//! - [`FilePermission`] matches file paths and file actions.
//! - [`SocketPermission`] matches hosts, port ranges and socket actions.
//!
//! # Deferred permissions
//!
//! A permission whose type is not available when it is granted is kept as a
//! [`DeferredPermission`]. It implies nothing until [`Permissions::resolve`]
//! binds it through a [`TypeLoader`] such as [`Catalog`], after a
//! [`TrustVerifier`] has accepted the signers it names. The deferred entries
//! of a set persist in the layout described in [`LegacyLayout`].
//!
//! # Guarded values
//!
//! [`Guarded`] pairs a value with a [`Guard`] that is consulted before the
//! value is handed out or serialized. [`PermissionGuard`] allows access
//! while a permission set implies a required permission.

mod error;
pub use error::*;

mod kind;
pub use kind::*;

mod permission;
pub use permission::*;

mod store;
pub use store::*;

mod all;
pub use all::*;

mod named;
pub use named::*;

mod file;
pub use file::*;

mod socket;
pub use socket::*;

mod config;
pub use config::*;

mod permissions;
pub use permissions::*;

mod trust;
pub use trust::*;

mod catalog;
pub use catalog::*;

mod deferred;
pub use deferred::*;

mod legacy;
pub use legacy::*;

mod decision;
pub use decision::*;

mod guard;
pub use guard::*;

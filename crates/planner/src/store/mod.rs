//! Object store abstraction.
//!
//! The [`ObjectStore`] trait is everything the reconciler needs from the
//! place objects live, allowing different implementations:
//! - [`MemoryStore`] for tests and embedding
//! - [`FileStore`] persisting JSON documents on disk

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{Kind, Labels, Object};
use std::collections::BTreeMap;
use std::fmt;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store trait for the two object kinds the planner touches.
///
/// Implementations assign `resourceVersion` and `creationTimestamp` on
/// create and reject updates whose `resourceVersion` is stale. Each call is
/// atomic: an object is either fully written or not at all.
pub trait ObjectStore: Send + Sync {
    /// Get one object.
    fn get<T: Object>(&self, namespace: &str, name: &str) -> Result<T>;

    /// List objects in a namespace whose labels match the selector,
    /// ordered by name.
    fn list<T: Object>(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<T>>;

    /// Create an object. Fails with `AlreadyExists` if the name is taken.
    fn create<T: Object>(&self, object: &T) -> Result<T>;

    /// Replace an object.
    ///
    /// When the object carries a `resourceVersion` it must match the stored
    /// one, otherwise the update fails with `Conflict`.
    fn update<T: Object>(&self, object: &T) -> Result<T>;

    /// Delete an object. Fails with `NotFound` if it doesn't exist.
    fn delete<T: Object>(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Equality-based label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    required: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching everything
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.required
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .required
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Reject identities that can't be stored.
pub(crate) fn validate_identity<T: Object>(object: &T) -> Result<()> {
    validate_key(T::KIND, object.namespace(), object.name())
}

/// Reject a lookup key that can't name a stored object.
///
/// Both stores key objects by `namespace/name`, so neither part may be
/// empty or contain a path separator.
pub(crate) fn validate_key(kind: Kind, namespace: &str, name: &str) -> Result<()> {
    validate_part(kind, "namespace", namespace)?;
    validate_part(kind, "name", name)
}

pub(crate) fn validate_part(kind: Kind, what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(StoreError::Invalid {
            message: format!("{kind} {what} {value:?} is not valid"),
        });
    }
    Ok(())
}

/// Parse a resource version produced by one of the stores
pub(crate) fn parse_version(version: Option<&str>) -> u64 {
    version.and_then(|v| v.parse().ok()).unwrap_or(0)
}

//! In-memory object store.

use super::{LabelSelector, ObjectStore, Result, parse_version, validate_identity};
use crate::error::StoreError;
use crate::types::{Kind, Object};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (Kind, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    last_version: u64,
}

/// Object store holding everything in a map.
///
/// Objects are kept as JSON values so that what comes back out has been
/// through the same serialization a real store would apply.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create, update and delete calls so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of stored objects of a kind, across namespaces
    pub fn count(&self, kind: Kind) -> usize {
        self.lock().objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn key_of<T: Object>(namespace: &str, name: &str) -> Key {
    (T::KIND, namespace.to_string(), name.to_string())
}

impl ObjectStore for MemoryStore {
    fn get<T: Object>(&self, namespace: &str, name: &str) -> Result<T> {
        let state = self.lock();
        let value = state
            .objects
            .get(&key_of::<T>(namespace, name))
            .ok_or_else(|| StoreError::not_found(T::KIND, namespace, name))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    fn list<T: Object>(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<T>> {
        let state = self.lock();
        let mut objects = Vec::new();
        for ((kind, ns, _), value) in &state.objects {
            if *kind != T::KIND || ns != namespace {
                continue;
            }
            let object: T = serde_json::from_value(value.clone())?;
            if selector.matches(object.labels()) {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    fn create<T: Object>(&self, object: &T) -> Result<T> {
        validate_identity(object)?;
        let mut state = self.lock();
        let key = key_of::<T>(object.namespace(), object.name());
        if state.objects.contains_key(&key) {
            return Err(StoreError::already_exists(
                T::KIND,
                object.namespace(),
                object.name(),
            ));
        }

        state.last_version += 1;
        let mut created = object.clone();
        let meta = created.metadata_mut();
        meta.resource_version = Some(state.last_version.to_string());
        meta.creation_timestamp = Some(Utc::now());

        state.objects.insert(key, serde_json::to_value(&created)?);
        self.record_mutation();
        Ok(created)
    }

    fn update<T: Object>(&self, object: &T) -> Result<T> {
        validate_identity(object)?;
        let mut state = self.lock();
        let key = key_of::<T>(object.namespace(), object.name());
        let stored: T = match state.objects.get(&key) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => {
                return Err(StoreError::not_found(
                    T::KIND,
                    object.namespace(),
                    object.name(),
                ));
            }
        };

        let stored_meta = stored.metadata();
        if let Some(version) = &object.metadata().resource_version
            && Some(version) != stored_meta.resource_version.as_ref()
        {
            return Err(StoreError::conflict(
                T::KIND,
                object.namespace(),
                object.name(),
                format!(
                    "resource version {version} is stale (stored {})",
                    parse_version(stored_meta.resource_version.as_deref())
                ),
            ));
        }

        state.last_version += 1;
        let mut updated = object.clone();
        let meta = updated.metadata_mut();
        meta.resource_version = Some(state.last_version.to_string());
        meta.creation_timestamp = stored_meta.creation_timestamp;

        state.objects.insert(key, serde_json::to_value(&updated)?);
        self.record_mutation();
        Ok(updated)
    }

    fn delete<T: Object>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .objects
            .remove(&key_of::<T>(namespace, name))
            .ok_or_else(|| StoreError::not_found(T::KIND, namespace, name))?;
        self.record_mutation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        GitRepository, GitRepositorySpec, ObjectMeta, SourceReference, Terraform, TerraformSpec,
    };

    fn source(name: &str) -> GitRepository {
        GitRepository::new(
            ObjectMeta::new("ns", name).with_label("team", "infra"),
            GitRepositorySpec::new("https://example.com/repo", "main"),
        )
    }

    #[test]
    fn test_create_assigns_metadata() {
        let store = MemoryStore::new();
        let created = store.create(&source("src")).unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.creation_timestamp.is_some());

        let fetched: GitRepository = store.get("ns", "src").unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.mutation_count(), 1);
    }

    #[test]
    fn test_create_existing_fails() {
        let store = MemoryStore::new();
        store.create(&source("src")).unwrap();
        let err = store.create(&source("src")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.mutation_count(), 1);
    }

    #[test]
    fn test_kinds_are_separate() {
        let store = MemoryStore::new();
        store.create(&source("same")).unwrap();
        let tf = Terraform::new(
            ObjectMeta::new("ns", "same"),
            TerraformSpec::new(SourceReference::git_repository("same")),
        );
        store.create(&tf).unwrap();
        assert_eq!(store.count(Kind::Terraform), 1);
        assert_eq!(store.count(Kind::GitRepository), 1);
    }

    #[test]
    fn test_update_rejects_stale_version() {
        let store = MemoryStore::new();
        let created = store.create(&source("src")).unwrap();

        let mut first = created.clone();
        first.spec.url = "https://example.com/other".into();
        let updated = store.update(&first).unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(
            updated.metadata.creation_timestamp,
            created.metadata.creation_timestamp
        );

        // `created` still carries version 1
        let err = store.update(&created).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_update_missing_fails() {
        let store = MemoryStore::new();
        let err = store.update(&source("src")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_filters_namespace_and_labels() {
        let store = MemoryStore::new();
        store.create(&source("b")).unwrap();
        store.create(&source("a")).unwrap();
        let mut other_ns = source("c");
        other_ns.metadata.namespace = "elsewhere".into();
        store.create(&other_ns).unwrap();
        let mut unlabeled = source("d");
        unlabeled.metadata.labels.clear();
        store.create(&unlabeled).unwrap();

        let selector = LabelSelector::everything().with("team", "infra");
        let listed: Vec<GitRepository> = store.list("ns", &selector).unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.create(&source("src")).unwrap();
        store.delete::<GitRepository>("ns", "src").unwrap();
        let err = store.delete::<GitRepository>("ns", "src").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.mutation_count(), 2);
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let store = MemoryStore::new();
        let err = store.create(&source("a/b")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }
}

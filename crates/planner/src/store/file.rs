//! Object store persisting JSON documents on disk.
//!
//! Layout: `<root>/<kind plural>/<namespace>/<name>.json`. Writes go to a
//! temporary file in the target directory which is then renamed into place,
//! so readers never see a half-written object.

use super::{
    LabelSelector, ObjectStore, Result, parse_version, validate_identity, validate_key,
    validate_part,
};
use crate::error::StoreError;
use crate::types::Object;
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// File-backed object store
///
/// Version checks and writes are serialized within one process. Two
/// processes sharing a root can still race on update.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        log::debug!("Opened file store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir<T: Object>(&self, namespace: &str) -> PathBuf {
        self.root.join(T::KIND.plural()).join(namespace)
    }

    fn object_path<T: Object>(&self, namespace: &str, name: &str) -> PathBuf {
        self.namespace_dir::<T>(namespace)
            .join(format!("{name}.json"))
    }

    fn read<T: Object>(&self, namespace: &str, name: &str) -> Result<T> {
        let path = self.object_path::<T>(namespace, name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(T::KIND, namespace, name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize `object` into a temp file next to its final path
    fn stage<T: Object>(&self, object: &T) -> Result<NamedTempFile> {
        let dir = self.namespace_dir::<T>(object.namespace());
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, object)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

impl ObjectStore for FileStore {
    fn get<T: Object>(&self, namespace: &str, name: &str) -> Result<T> {
        validate_key(T::KIND, namespace, name)?;
        self.read(namespace, name)
    }

    fn list<T: Object>(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<T>> {
        validate_part(T::KIND, "namespace", namespace)?;
        let dir = self.namespace_dir::<T>(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let object: T = serde_json::from_str(&content)?;
            if selector.matches(object.labels()) {
                objects.push(object);
            }
        }
        objects.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(objects)
    }

    fn create<T: Object>(&self, object: &T) -> Result<T> {
        validate_identity(object)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut created = object.clone();
        let meta = created.metadata_mut();
        meta.resource_version = Some("1".to_string());
        meta.creation_timestamp = Some(Utc::now());

        let path = self.object_path::<T>(object.namespace(), object.name());
        let tmp = self.stage(&created)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::already_exists(
                    T::KIND,
                    object.namespace(),
                    object.name(),
                ));
            }
            Err(e) => return Err(e.error.into()),
        }

        log::debug!("Wrote {} {}", T::KIND, path.display());
        Ok(created)
    }

    fn update<T: Object>(&self, object: &T) -> Result<T> {
        validate_identity(object)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored: T = self.read(object.namespace(), object.name())?;
        let stored_meta = stored.metadata();
        if let Some(version) = &object.metadata().resource_version
            && Some(version) != stored_meta.resource_version.as_ref()
        {
            return Err(StoreError::conflict(
                T::KIND,
                object.namespace(),
                object.name(),
                format!("resource version {version} is stale"),
            ));
        }

        let mut updated = object.clone();
        let meta = updated.metadata_mut();
        meta.resource_version =
            Some((parse_version(stored_meta.resource_version.as_deref()) + 1).to_string());
        meta.creation_timestamp = stored_meta.creation_timestamp;

        let path = self.object_path::<T>(object.namespace(), object.name());
        self.stage(&updated)?
            .persist(&path)
            .map_err(|e| StoreError::Io(e.error))?;

        log::debug!("Rewrote {} {}", T::KIND, path.display());
        Ok(updated)
    }

    fn delete<T: Object>(&self, namespace: &str, name: &str) -> Result<()> {
        validate_key(T::KIND, namespace, name)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.object_path::<T>(namespace, name);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed {} {}", T::KIND, path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(T::KIND, namespace, name))
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! Object storage boundary.
//!
//! The engine only passes object references around; steps that need bytes
//! go through an [`ObjectStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::StepError;

/// Reference to an object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object's bytes.
    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StepError>;

    /// Write (create or replace) an object.
    async fn write(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), StepError>;

    /// Check whether an object exists.
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StepError> {
        match self.read(object).await {
            Ok(_) => Ok(true),
            Err(StepError::ObjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectRef, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StepError> {
        self.objects
            .read()
            .await
            .get(object)
            .cloned()
            .ok_or_else(|| StepError::ObjectNotFound(object.to_string()))
    }

    async fn write(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), StepError> {
        self.objects.write().await.insert(object.clone(), bytes);
        Ok(())
    }

    async fn exists(&self, object: &ObjectRef) -> Result<bool, StepError> {
        Ok(self.objects.read().await.contains_key(object))
    }
}

/// Filesystem store: each bucket is a directory under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, object: &ObjectRef) -> Result<PathBuf, StepError> {
        let relative = Path::new(&object.bucket).join(&object.key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StepError::Configuration(format!(
                "Object reference escapes the store root: {}",
                object
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StepError> {
        let path = self.path_for(object)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StepError::ObjectNotFound(object.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), StepError> {
        let path = self.path_for(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(object = %object, "Object written");
        Ok(())
    }

    async fn exists(&self, object: &ObjectRef) -> Result<bool, StepError> {
        let path = self.path_for(object)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

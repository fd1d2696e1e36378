use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Blob storage for generated models.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError>;
}

/// Storage path of a generated model: `models/{user_id}/{job_id}/{asset_name}`.
pub fn model_path(
    user_id: impl core::fmt::Display,
    job_id: impl core::fmt::Display,
    asset_name: &str,
) -> String {
    format!("models/{user_id}/{job_id}/{asset_name}")
}

pub fn content_type_for(asset_name: &str) -> &'static str {
    let ext = Path::new(asset_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("glb") => "model/gltf-binary",
        Some("obj") => "model/obj",
        Some("stl") => "model/stl",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory object store for tests/dev.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        let objects = self.objects.read().ok()?;
        objects.get(path).map(|o| o.content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> ObjectStoreError {
    ObjectStoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }
}

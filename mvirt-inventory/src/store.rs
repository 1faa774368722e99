//! Local resource store.
//!
//! [`ResourceStore`] is the seam to wherever resource documents are
//! persisted. [`MemoryStore`] keeps them in memory and can be saved to and
//! loaded from a JSON file, which is how the daemon keeps state between
//! runs.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::ResourceDocument;
use crate::key::LocalKey;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict with existing resource.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted resource documents, addressed by local key.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read a document. Absent documents are [`StoreError::NotFound`].
    async fn read(&self, key: &LocalKey) -> Result<ResourceDocument>;

    /// Create a document under its own key.
    async fn create(&self, doc: ResourceDocument) -> Result<LocalKey>;

    /// Replace the document stored under `key`.
    async fn update(&self, key: &LocalKey, doc: ResourceDocument) -> Result<()>;

    /// Delete a document.
    async fn delete(&self, key: &LocalKey) -> Result<()>;

    /// Keys of every document owned by `endpoint_link`.
    async fn list_links(&self, endpoint_link: &str) -> Result<Vec<LocalKey>>;

    /// Whether any other document names `key` as its placement target.
    async fn has_placement_reference(&self, key: &LocalKey) -> Result<bool>;
}

/// In-memory store, optionally backed by a JSON file.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<LocalKey, ResourceDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load documents from `path`; a missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let docs: Vec<ResourceDocument> = serde_json::from_slice(&raw)?;
        Ok(Self::from_documents(docs))
    }

    pub fn from_documents(docs: impl IntoIterator<Item = ResourceDocument>) -> Self {
        let documents = docs.into_iter().map(|d| (d.key.clone(), d)).collect();
        Self {
            documents: RwLock::new(documents),
        }
    }

    /// Write all documents to `path`, replacing it atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let docs = self.documents().await;
        let raw = serde_json::to_vec_pretty(&docs)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Saved {} documents to {}", docs.len(), path.display());
        Ok(())
    }

    /// All documents, ordered by key.
    pub async fn documents(&self) -> Vec<ResourceDocument> {
        self.documents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Insert or replace without create/update checks.
    pub async fn put(&self, doc: ResourceDocument) {
        self.documents.write().await.insert(doc.key.clone(), doc);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn read(&self, key: &LocalKey) -> Result<ResourceDocument> {
        self.documents
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create(&self, doc: ResourceDocument) -> Result<LocalKey> {
        let mut docs = self.documents.write().await;
        if docs.contains_key(&doc.key) {
            return Err(StoreError::Conflict(format!("{} already exists", doc.key)));
        }
        let key = doc.key.clone();
        docs.insert(key.clone(), doc);
        Ok(key)
    }

    async fn update(&self, key: &LocalKey, doc: ResourceDocument) -> Result<()> {
        let mut docs = self.documents.write().await;
        match docs.get_mut(key) {
            Some(existing) => {
                *existing = doc;
                Ok(())
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &LocalKey) -> Result<()> {
        self.documents
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_links(&self, endpoint_link: &str) -> Result<Vec<LocalKey>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.endpoint_link == endpoint_link)
            .map(|d| d.key.clone())
            .collect())
    }

    async fn has_placement_reference(&self, key: &LocalKey) -> Result<bool> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .any(|d| &d.key != key && d.placement_link.as_ref() == Some(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EntityKind, PassScope};
    use crate::remote::{ObjectKind, RemoteIdentity};

    fn scope(endpoint: &str) -> PassScope {
        PassScope {
            endpoint_link: endpoint.to_string(),
            tenant_links: vec!["/tenants/t1".to_string()],
            region_id: None,
        }
    }

    fn doc(key: &str, endpoint: &str) -> ResourceDocument {
        ResourceDocument::desired(
            LocalKey::from(key),
            EntityKind::Host,
            key,
            &scope(endpoint),
            RemoteIdentity::new(ObjectKind::HostSystem, key),
        )
    }

    #[tokio::test]
    async fn test_crud() {
        let store = MemoryStore::new();
        let key = store.create(doc("/resources/hosts/a", "/e/1")).await.unwrap();
        assert!(matches!(
            store.create(doc("/resources/hosts/a", "/e/1")).await,
            Err(StoreError::Conflict(_))
        ));

        let mut updated = store.read(&key).await.unwrap();
        updated.name = "renamed".to_string();
        store.update(&key, updated).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap().name, "renamed");

        store.delete(&key).await.unwrap();
        assert!(store.read(&key).await.unwrap_err().is_not_found());
        assert!(store.update(&key, doc("/resources/hosts/a", "/e/1")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_links_filters_endpoint() {
        let store = MemoryStore::from_documents([
            doc("/resources/hosts/a", "/e/1"),
            doc("/resources/hosts/b", "/e/2"),
        ]);
        let links = store.list_links("/e/1").await.unwrap();
        assert_eq!(links, vec![LocalKey::from("/resources/hosts/a")]);
    }

    #[tokio::test]
    async fn test_placement_reference() {
        let target = doc("/resources/compute/c1", "/e/1");
        let mut vm = doc("/resources/vms/w1", "/e/1");
        vm.placement_link = Some(target.key.clone());
        let store = MemoryStore::from_documents([target.clone(), vm.clone()]);

        assert!(store.has_placement_reference(&target.key).await.unwrap());
        assert!(!store.has_placement_reference(&vm.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let missing = MemoryStore::load(&path).await.unwrap();
        assert!(missing.is_empty().await);

        let store = MemoryStore::from_documents([doc("/resources/hosts/a", "/e/1")]);
        store.save(&path).await.unwrap();

        let loaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(loaded.documents().await, store.documents().await);
    }
}

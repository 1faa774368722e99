#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use mvirt_inventory::remote::{Snapshot, SnapshotObject};
use mvirt_inventory::store::{Result as StoreResult, StoreError};
use mvirt_inventory::{
    Enumerator, LocalKey, MemoryStore, ObjectKind, PassConfig, PassScope, PropertyBag,
    RemoteIdentity, RemoteInventory, ResourceDocument, ResourceStore, SnapshotInventory,
    derive_key,
};

pub const ENDPOINT: &str = "/resources/endpoints/vc-1";

pub fn scope() -> PassScope {
    PassScope {
        endpoint_link: ENDPOINT.to_string(),
        tenant_links: vec!["/tenants/acme".to_string()],
        region_id: Some("eu-central".to_string()),
    }
}

pub fn id(kind: ObjectKind, value: &str) -> RemoteIdentity {
    RemoteIdentity::new(kind, value)
}

pub fn root() -> RemoteIdentity {
    id(ObjectKind::Folder, "group-d1")
}

pub fn key(kind: ObjectKind, value: &str) -> LocalKey {
    derive_key(&id(kind, value), ENDPOINT)
}

/// The demo inventory shipped with the crate.
pub fn demo_snapshot() -> Snapshot {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/inventory.json");
    let raw = std::fs::read(path).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

/// Drop `victim` and every reference to it from the snapshot.
pub fn remove_object(snapshot: &mut Snapshot, victim: &RemoteIdentity) {
    snapshot.objects.retain(|o| &o.id != victim);
    for object in &mut snapshot.objects {
        object.children.retain(|c| c != victim);
    }
}

pub fn object(
    kind: ObjectKind,
    value: &str,
    children: Vec<RemoteIdentity>,
    properties: PropertyBag,
) -> SnapshotObject {
    SnapshotObject {
        id: id(kind, value),
        children,
        properties,
    }
}

pub fn config() -> PassConfig {
    PassConfig {
        pass_timeout: Duration::from_secs(30),
        link_timeout: Duration::from_secs(5),
        max_concurrent_fetches: 4,
    }
}

pub fn enumerator(remote: impl RemoteInventory + 'static, store: &Arc<MemoryStore>) -> Enumerator {
    Enumerator::new(Arc::new(remote), store.clone(), config())
}

pub fn doc(store_docs: &[ResourceDocument], key: &LocalKey) -> ResourceDocument {
    store_docs
        .iter()
        .find(|d| &d.key == key)
        .cloned()
        .unwrap_or_else(|| panic!("no document at {}", key))
}

/// Snapshot inventory whose property fetches fail for selected objects.
pub struct FailingInventory {
    inner: SnapshotInventory,
    failing: HashSet<RemoteIdentity>,
}

impl FailingInventory {
    pub fn new(snapshot: Snapshot, failing: impl IntoIterator<Item = RemoteIdentity>) -> Self {
        Self {
            inner: SnapshotInventory::new(snapshot),
            failing: failing.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RemoteInventory for FailingInventory {
    async fn discover(&self, root: &RemoteIdentity) -> Result<Vec<RemoteIdentity>> {
        self.inner.discover(root).await
    }

    async fn fetch_properties(&self, id: &RemoteIdentity) -> Result<PropertyBag> {
        if self.failing.contains(id) {
            return Err(anyhow!("connection reset while fetching {}", id));
        }
        self.inner.fetch_properties(id).await
    }
}

/// Snapshot inventory whose property fetches stall for one kind of object.
pub struct SlowInventory {
    inner: SnapshotInventory,
    slow: ObjectKind,
    delay: Duration,
}

impl SlowInventory {
    pub fn new(snapshot: Snapshot, slow: ObjectKind, delay: Duration) -> Self {
        Self {
            inner: SnapshotInventory::new(snapshot),
            slow,
            delay,
        }
    }
}

#[async_trait]
impl RemoteInventory for SlowInventory {
    async fn discover(&self, root: &RemoteIdentity) -> Result<Vec<RemoteIdentity>> {
        self.inner.discover(root).await
    }

    async fn fetch_properties(&self, id: &RemoteIdentity) -> Result<PropertyBag> {
        if id.kind == self.slow {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.fetch_properties(id).await
    }
}

/// Memory store that fails or stalls selected keys.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    failing_reads: HashSet<LocalKey>,
    failing_writes: HashSet<LocalKey>,
    stalled_writes: HashSet<LocalKey>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            stalled_writes: HashSet::new(),
        }
    }

    pub fn fail_reads(mut self, keys: impl IntoIterator<Item = LocalKey>) -> Self {
        self.failing_reads.extend(keys);
        self
    }

    /// Creates and updates of `keys` fail.
    pub fn fail_writes(mut self, keys: impl IntoIterator<Item = LocalKey>) -> Self {
        self.failing_writes.extend(keys);
        self
    }

    /// Creates and updates of `keys` never complete.
    pub fn stall_writes(mut self, keys: impl IntoIterator<Item = LocalKey>) -> Self {
        self.stalled_writes.extend(keys);
        self
    }

    async fn before_write(&self, key: &LocalKey) -> StoreResult<()> {
        if self.stalled_writes.contains(key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing_writes.contains(key) {
            return Err(StoreError::Internal("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn read(&self, key: &LocalKey) -> StoreResult<ResourceDocument> {
        if self.failing_reads.contains(key) {
            return Err(StoreError::Internal("read timed out".to_string()));
        }
        self.inner.read(key).await
    }

    async fn create(&self, doc: ResourceDocument) -> StoreResult<LocalKey> {
        self.before_write(&doc.key).await?;
        self.inner.create(doc).await
    }

    async fn update(&self, key: &LocalKey, doc: ResourceDocument) -> StoreResult<()> {
        self.before_write(key).await?;
        self.inner.update(key, doc).await
    }

    async fn delete(&self, key: &LocalKey) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn list_links(&self, endpoint_link: &str) -> StoreResult<Vec<LocalKey>> {
        self.inner.list_links(endpoint_link).await
    }

    async fn has_placement_reference(&self, key: &LocalKey) -> StoreResult<bool> {
        self.inner.has_placement_reference(key).await
    }
}

//! Reconcilers for the different entity kinds.
//!
//! Each reconciler turns one overlay into the desired-state document for its
//! kind. [`reconcile_object`] runs the shared lookup-or-create-or-update
//! procedure around it and records the outcome on the kind's tracker.

pub mod compute;
pub mod datastore;
pub mod folder;
pub mod host;
pub mod network;
pub mod resource_pool;
pub mod vm;

use std::ops::AddAssign;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::EnumerationContext;
use crate::document::ResourceDocument;
use crate::error::{Result, SyncError};
use crate::key::LocalKey;
use crate::overlay::AnyOverlay;
use crate::remote::{ObjectKind, RemoteIdentity};
use crate::store::ResourceStore;
use crate::tracker::Outcome;

/// Trait for entity reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Build the desired-state document for `overlay`, to be stored at `key`.
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument>;

    /// Reconcile resources owned by the object just persisted at `owner`.
    async fn reconcile_owned(
        &self,
        _ctx: &EnumerationContext,
        _store: &dyn ResourceStore,
        _overlay: &AnyOverlay,
        _owner: &LocalKey,
    ) -> Tally {
        Tally::default()
    }
}

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
}

/// Counters accumulated over a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
}

impl Tally {
    pub fn applied(applied: Applied) -> Self {
        match applied {
            Applied::Created => Tally {
                created: 1,
                ..Default::default()
            },
            Applied::Updated => Tally {
                updated: 1,
                ..Default::default()
            },
        }
    }

    pub fn error() -> Self {
        Tally {
            errors: 1,
            ..Default::default()
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.errors += rhs.errors;
    }
}

/// Error for an overlay handed to the wrong reconciler.
pub(crate) fn mismatch(overlay: &AnyOverlay, expected: &'static [ObjectKind]) -> SyncError {
    SyncError::TypeMismatch {
        identity: overlay.identity().clone(),
        expected,
    }
}

fn reconciler_for(overlay: &AnyOverlay) -> &'static dyn Reconciler {
    match overlay {
        AnyOverlay::Datacenter(_) => &folder::DatacenterReconciler,
        AnyOverlay::Folder(_) => &folder::FolderReconciler,
        AnyOverlay::Network(_) => &network::NetworkReconciler,
        AnyOverlay::Datastore(_) => &datastore::DatastoreReconciler,
        AnyOverlay::Host(_) => &host::HostReconciler,
        AnyOverlay::ComputeResource(_) => &compute::ComputeResourceReconciler,
        AnyOverlay::ResourcePool(_) => &resource_pool::ResourcePoolReconciler,
        AnyOverlay::Vm(_) => &vm::VmReconciler,
    }
}

/// Read the persisted document at `key`; not-found is `None`.
pub async fn read_existing(
    store: &dyn ResourceStore,
    id: &RemoteIdentity,
    key: &LocalKey,
) -> Result<Option<ResourceDocument>> {
    match store.read(key).await {
        Ok(doc) => Ok(Some(doc)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(SyncError::RetrievalFailure {
            identity: id.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Update `existing` to `desired`, or create `desired` if nothing exists.
pub async fn write(
    store: &dyn ResourceStore,
    id: &RemoteIdentity,
    desired: ResourceDocument,
    existing: Option<&ResourceDocument>,
) -> Result<Applied> {
    let persist_failure = |e: crate::store::StoreError| SyncError::PersistFailure {
        identity: id.clone(),
        reason: e.to_string(),
    };

    match existing {
        Some(existing) => {
            let doc = desired.carry_forward(existing);
            store
                .update(&existing.key, doc)
                .await
                .map_err(persist_failure)?;
            Ok(Applied::Updated)
        }
        None => {
            store.create(desired).await.map_err(persist_failure)?;
            Ok(Applied::Created)
        }
    }
}

/// Upsert one object: read by key, build the desired document, write it.
pub async fn upsert(
    ctx: &EnumerationContext,
    store: &dyn ResourceStore,
    reconciler: &dyn Reconciler,
    overlay: &AnyOverlay,
    key: &LocalKey,
) -> Result<Applied> {
    let id = overlay.identity();
    // A read failure other than not-found means we cannot tell create from
    // update; nothing is written.
    let existing = read_existing(store, id, key).await?;
    let desired = reconciler.desired(ctx, overlay, key.clone()).await?;
    write(store, id, desired, existing.as_ref()).await
}

/// Reconcile one discovered object and record its outcome.
pub async fn reconcile_object(
    ctx: &EnumerationContext,
    store: &dyn ResourceStore,
    overlay: &AnyOverlay,
) -> Tally {
    let id = overlay.identity();
    let key = ctx.key_for(id);
    let reconciler = reconciler_for(overlay);

    match upsert(ctx, store, reconciler, overlay, &key).await {
        Ok(applied) => {
            match applied {
                Applied::Created => info!("Created {} {} at {}", overlay.entity_kind(), id, key),
                Applied::Updated => debug!("Updated {} {} at {}", overlay.entity_kind(), id, key),
            }
            ctx.record_or_log(id, Outcome::Linked(key.clone()));
            ctx.touch(&key);

            let mut tally = Tally::applied(applied);
            tally += reconciler.reconcile_owned(ctx, store, overlay, &key).await;
            tally
        }
        Err(e) => {
            warn!("Failed to reconcile {}: {}", id, e);
            ctx.record_or_log(id, Outcome::Failed);
            ctx.defer(&key);
            Tally::error()
        }
    }
}

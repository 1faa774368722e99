//! Datastore reconciler.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{Capacity, EntityKind, PowerState, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, DatastoreOverlay, Overlay};

pub struct DatastoreReconciler;

#[async_trait]
impl Reconciler for DatastoreReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Datastore(ds) = overlay else {
            return Err(mismatch(overlay, DatastoreOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::Datastore,
            ds.name()?,
            ctx.scope(),
            ds.identity().clone(),
        );
        doc.capacity = Capacity {
            storage_bytes: Some(ds.capacity_bytes()?),
            free_bytes: ds.free_bytes(),
            ..Default::default()
        };
        doc.power_state = if ds.is_accessible() {
            PowerState::On
        } else {
            PowerState::Off
        };
        if let Some(parent) = ds.parent() {
            doc.parent_link = ctx.resolve_link(&parent).await;
        }
        Ok(doc)
    }
}

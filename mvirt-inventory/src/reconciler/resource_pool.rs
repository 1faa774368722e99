//! Resource pool reconciler.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{Capacity, EntityKind, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, Overlay, ResourcePoolOverlay};

pub struct ResourcePoolReconciler;

#[async_trait]
impl Reconciler for ResourcePoolReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::ResourcePool(pool) = overlay else {
            return Err(mismatch(overlay, ResourcePoolOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::ResourcePool,
            pool.qualified_name()?,
            ctx.scope(),
            pool.identity().clone(),
        );
        doc.capacity = Capacity {
            cpu_mhz: u64::try_from(pool.cpu_limit_mhz()).ok(),
            memory_bytes: u64::try_from(pool.memory_limit_mb())
                .ok()
                .map(|mb| mb.saturating_mul(1024 * 1024)),
            ..Default::default()
        };
        // The name comes from the owner's overlay; the link needs the
        // owner's persisted key, so that one goes through its tracker.
        doc.parent_link = ctx.resolve_link(&pool.owner()?).await;
        Ok(doc)
    }
}

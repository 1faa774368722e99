//! Compute resource (cluster / standalone) reconciler.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{Capacity, EntityKind, PowerState, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, ComputeResourceOverlay, Overlay};

pub struct ComputeResourceReconciler;

#[async_trait]
impl Reconciler for ComputeResourceReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::ComputeResource(compute) = overlay else {
            return Err(mismatch(overlay, ComputeResourceOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::ComputeResource,
            compute.name()?,
            ctx.scope(),
            compute.identity().clone(),
        );
        doc.capacity = Capacity {
            cpu_count: Some(compute.cpu_cores()),
            cpu_mhz: Some(compute.effective_cpu_mhz()),
            memory_bytes: Some(compute.effective_memory_bytes()),
            ..Default::default()
        };
        doc.power_state = if compute.hosts().is_empty() {
            PowerState::Off
        } else {
            PowerState::On
        };
        if let Some(parent) = compute.parent() {
            doc.parent_link = ctx.resolve_link(&parent).await;
        }
        Ok(doc)
    }
}

//! Host reconciler.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{Capacity, EntityKind, PowerState, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, HostOverlay, Overlay};

pub struct HostReconciler;

#[async_trait]
impl Reconciler for HostReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Host(host) = overlay else {
            return Err(mismatch(overlay, HostOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::Host,
            host.name()?,
            ctx.scope(),
            host.identity().clone(),
        );
        doc.capacity = Capacity {
            cpu_count: Some(host.cpu_cores()?),
            cpu_mhz: Some(host.cpu_mhz()),
            memory_bytes: Some(host.memory_bytes()?),
            ..Default::default()
        };
        doc.power_state = if host.connection_state() == "connected" {
            PowerState::from_remote(&host.power_state())
        } else {
            PowerState::Unknown
        };

        let parent = ctx.resolve_link(&host.parent()?).await;
        // Clustered hosts are placed in their cluster; a standalone host's
        // compute resource is only a wrapper around it.
        if host.is_clustered() {
            doc.placement_link = parent.clone();
        }
        doc.parent_link = parent;
        Ok(doc)
    }
}

//! Network reconciler.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{EntityKind, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, NetworkOverlay, Overlay};

pub struct NetworkReconciler;

#[async_trait]
impl Reconciler for NetworkReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Network(network) = overlay else {
            return Err(mismatch(overlay, NetworkOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::Network,
            network.name()?,
            ctx.scope(),
            network.identity().clone(),
        );
        if let Some(parent) = network.parent() {
            doc.parent_link = ctx.resolve_link(&parent).await;
        }
        Ok(doc)
    }
}

//! Datacenter and folder reconcilers.

use async_trait::async_trait;

use super::{Reconciler, mismatch};
use crate::context::EnumerationContext;
use crate::document::{EntityKind, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, DatacenterOverlay, FolderOverlay, Overlay};

pub struct DatacenterReconciler;

#[async_trait]
impl Reconciler for DatacenterReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Datacenter(dc) = overlay else {
            return Err(mismatch(overlay, DatacenterOverlay::ACCEPTED));
        };

        Ok(ResourceDocument::desired(
            key,
            EntityKind::Datacenter,
            dc.name()?,
            ctx.scope(),
            dc.identity().clone(),
        ))
    }
}

pub struct FolderReconciler;

#[async_trait]
impl Reconciler for FolderReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Folder(folder) = overlay else {
            return Err(mismatch(overlay, FolderOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::Folder,
            folder.name()?,
            ctx.scope(),
            folder.identity().clone(),
        );
        if let Some(parent) = folder.parent() {
            doc.parent_link = ctx.resolve_link(&parent).await;
        }
        Ok(doc)
    }
}

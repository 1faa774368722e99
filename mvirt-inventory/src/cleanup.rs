//! Orphan cleanup - runs after a pass has reconciled everything it saw.
//!
//! Every link still in the pass's still-present set belongs to a resource
//! the remote side no longer reports. Leaf workload units (VMs, disks) are
//! deleted outright, except disks whose VM failed to reconcile this pass.
//! Anything else is deleted unless another resource still names it as its
//! placement target, in which case it is retired instead so the reference
//! does not dangle. Orphans are handled in tiers (leaves, hosts, the rest)
//! so the outcome does not depend on task scheduling.
//!
//! Each orphan gets exactly one attempt. Failures are logged and the
//! resource stays as it is; the next pass sees it as an orphan again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::{EnumerationContext, TrackerKind};
use crate::document::{EntityKind, LifecycleState, ResourceDocument};
use crate::key::LocalKey;
use crate::store::ResourceStore;
use crate::tracker::Outcome;

/// What cleanup did to one orphan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposal {
    Deleted,
    Retired,
    /// Already retired by an earlier pass.
    Unchanged,
    Failed,
}

/// Summary of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub retired: usize,
    pub failed: usize,
    /// Every link that was an orphan candidate, ordered.
    pub orphan_links: Vec<LocalKey>,
}

impl CleanupReport {
    fn count(&mut self, disposal: Disposal) {
        match disposal {
            Disposal::Deleted => self.deleted += 1,
            Disposal::Retired => self.retired += 1,
            Disposal::Unchanged => {}
            Disposal::Failed => self.failed += 1,
        }
    }
}

/// Order in which orphans are handled. A tier only holds placement
/// references into later tiers, so once a tier is gone it no longer keeps
/// anything in the next one alive.
fn tier(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::VirtualMachine | EntityKind::Disk => 0,
        EntityKind::Host => 1,
        _ => 2,
    }
}

/// Delete or retire every resource the pass did not touch.
pub async fn cleanup_orphans(
    ctx: Arc<EnumerationContext>,
    store: Arc<dyn ResourceStore>,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let tiers = collect_orphans(&ctx, store.as_ref(), &mut report).await;
    if report.orphan_links.is_empty() {
        debug!("No orphans for {}", ctx.endpoint_link());
        return report;
    }

    for (tier, docs) in tiers {
        if tier == 0 {
            delete_leaves(&ctx, &store, docs, &mut report).await;
            continue;
        }
        let mut tasks = JoinSet::new();
        for doc in docs {
            let store = Arc::clone(&store);
            tasks.spawn(async move { delete_or_retire(store.as_ref(), doc).await });
        }
        join_into(&mut tasks, &mut report).await;
    }

    info!(
        "Cleanup for {}: {} orphans, {} deleted, {} retired, {} failed",
        ctx.endpoint_link(),
        report.orphan_links.len(),
        report.deleted,
        report.retired,
        report.failed
    );
    report
}

/// The orphan links of a pass, without touching any of them.
pub async fn list_orphans(ctx: &EnumerationContext, store: &dyn ResourceStore) -> Vec<LocalKey> {
    let mut report = CleanupReport::default();
    collect_orphans(ctx, store, &mut report).await;
    report.orphan_links
}

/// Read every untouched link into `report.orphan_links` and bucket the
/// documents by tier.
async fn collect_orphans(
    ctx: &EnumerationContext,
    store: &dyn ResourceStore,
    report: &mut CleanupReport,
) -> BTreeMap<u8, Vec<ResourceDocument>> {
    report.orphan_links = ctx.untouched();

    let mut tiers: BTreeMap<u8, Vec<ResourceDocument>> = BTreeMap::new();
    for key in &report.orphan_links {
        match store.read(key).await {
            // Disks of a VM that failed this pass were not enumerated; they
            // are as present as the VM is.
            Ok(doc) if doc.kind == EntityKind::Disk && owner_deferred(ctx, &doc) => {
                debug!("Keeping disk {} of deferred {:?}", key, doc.parent_link);
                ctx.defer(key);
            }
            Ok(doc) => tiers.entry(tier(doc.kind)).or_default().push(doc),
            // Gone already; nothing to clean up.
            Err(e) if e.is_not_found() => debug!("Orphan {} already gone", key),
            Err(e) => {
                warn!("Failed to read orphan {}: {}", key, e);
                report.failed += 1;
            }
        }
    }
    report.orphan_links.retain(|key| !ctx.is_deferred(key));
    tiers
}

fn owner_deferred(ctx: &EnumerationContext, doc: &ResourceDocument) -> bool {
    doc.parent_link.as_ref().is_some_and(|vm| ctx.is_deferred(vm))
}

/// Delete orphaned VMs and disks.
///
/// Disk deletions are counted on the `DeletedDisks` tracker, which is
/// awaited while they are in flight. The tier is bounded by the time left
/// in the pass; deletions still running then are aborted and counted as
/// failed.
async fn delete_leaves(
    ctx: &EnumerationContext,
    store: &Arc<dyn ResourceStore>,
    leaves: Vec<ResourceDocument>,
    report: &mut CleanupReport,
) {
    let disks = leaves.iter().filter(|d| d.kind == EntityKind::Disk).count();
    let disk_tracker = match ctx.expect(TrackerKind::DeletedDisks, disks) {
        Ok(tracker) => Some(tracker),
        Err(e) => {
            warn!("Cannot track disk deletions: {}", e);
            None
        }
    };

    let mut tasks = JoinSet::new();
    for doc in leaves {
        let store = Arc::clone(store);
        let tracker = disk_tracker.clone();
        tasks.spawn(async move {
            let disposal = delete(store.as_ref(), &doc).await;
            if let (EntityKind::Disk, Some(tracker)) = (doc.kind, tracker) {
                let outcome = match disposal {
                    Disposal::Deleted => Outcome::Linked(doc.key.clone()),
                    _ => Outcome::Failed,
                };
                if let Err(e) = tracker.record(doc.remote_id.clone(), outcome) {
                    warn!("Failed to record disk deletion {}: {}", doc.key, e);
                }
            }
            disposal
        });
    }

    if let Some(tracker) = &disk_tracker {
        if !tracker.await_all(Some(ctx.time_left())).await {
            warn!(
                "{} disk deletions still outstanding for {}, abandoning them",
                tracker.remaining(),
                ctx.endpoint_link()
            );
            tasks.abort_all();
        }
    }
    let joined = tokio::time::timeout(ctx.time_left(), join_into(&mut tasks, report)).await;
    if joined.is_err() {
        warn!("Leaf cleanup for {} ran out of time", ctx.endpoint_link());
        tasks.abort_all();
        join_into(&mut tasks, report).await;
    }
}

async fn join_into(tasks: &mut JoinSet<Disposal>, report: &mut CleanupReport) {
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(disposal) => report.count(disposal),
            Err(e) => {
                warn!("Cleanup task failed: {}", e);
                report.failed += 1;
            }
        }
    }
}

async fn delete(store: &dyn ResourceStore, doc: &ResourceDocument) -> Disposal {
    match store.delete(&doc.key).await {
        Ok(()) => {
            info!("Deleted orphaned {} {} ({})", doc.kind, doc.name, doc.key);
            Disposal::Deleted
        }
        Err(e) if e.is_not_found() => Disposal::Deleted,
        Err(e) => {
            warn!("Failed to delete orphaned {} {}: {}", doc.kind, doc.key, e);
            Disposal::Failed
        }
    }
}

async fn delete_or_retire(store: &dyn ResourceStore, mut doc: ResourceDocument) -> Disposal {
    let referenced = match store.has_placement_reference(&doc.key).await {
        Ok(referenced) => referenced,
        Err(e) => {
            warn!("Failed to check references to {}: {}", doc.key, e);
            return Disposal::Failed;
        }
    };

    if !referenced {
        return delete(store, &doc).await;
    }
    if doc.lifecycle == LifecycleState::Retired {
        debug!("{} {} already retired", doc.kind, doc.key);
        return Disposal::Unchanged;
    }

    doc.retire();
    let key = doc.key.clone();
    match store.update(&key, doc).await {
        Ok(()) => {
            info!("Retired orphaned {} (still referenced)", key);
            Disposal::Retired
        }
        Err(e) => {
            warn!("Failed to retire {}: {}", key, e);
            Disposal::Failed
        }
    }
}

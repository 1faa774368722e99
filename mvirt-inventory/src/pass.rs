//! Pass driver.
//!
//! One call to [`Enumerator::run_pass`] is one enumeration pass: discover
//! everything below a root, fetch and materialize overlays, reconcile every
//! overlay concurrently, then clean up orphans.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cleanup::{cleanup_orphans, list_orphans};
use crate::context::{EnumerationContext, TrackerKind};
use crate::document::{EntityKind, PassScope};
use crate::error::{Result, SyncError};
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, Overlay};
use crate::reconciler::{Tally, reconcile_object};
use crate::remote::{RemoteIdentity, RemoteInventory};
use crate::store::ResourceStore;
use crate::tracker::Outcome;

/// Pass tuning.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Hard bound on one pass; reconciliation still running then is abandoned.
    pub pass_timeout: Duration,
    /// Longest a child waits for its parent's outcome.
    pub link_timeout: Duration,
    /// Remote property fetches in flight at once.
    pub max_concurrent_fetches: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(30 * 60),
            link_timeout: Duration::from_secs(60),
            max_concurrent_fetches: 32,
        }
    }
}

/// Counters reported at the end of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassResult {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub deleted: usize,
    pub retired: usize,
    /// Known links this pass did not observe.
    pub orphan_links: Vec<LocalKey>,
}

/// Runs enumeration passes of one remote inventory into one store.
pub struct Enumerator {
    remote: Arc<dyn RemoteInventory>,
    store: Arc<dyn ResourceStore>,
    config: PassConfig,
}

impl Enumerator {
    pub fn new(
        remote: Arc<dyn RemoteInventory>,
        store: Arc<dyn ResourceStore>,
        config: PassConfig,
    ) -> Self {
        Self {
            remote,
            store,
            config,
        }
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Run one pass over everything below `root`.
    ///
    /// Only a failure to enumerate `root` fails the pass. Per-object
    /// failures are counted in [`PassResult::errors`].
    pub async fn run_pass(&self, scope: &PassScope, root: &RemoteIdentity) -> Result<PassResult> {
        let started = Instant::now();
        let deadline = started + self.config.pass_timeout;

        let known = match self.store.list_links(&scope.endpoint_link).await {
            Ok(links) => links,
            Err(e) => {
                // Without the known links nothing can be recognized as an
                // orphan, which is the safe direction to fail in.
                warn!("Failed to list links for {}: {}", scope.endpoint_link, e);
                Vec::new()
            }
        };
        debug!("{} known links for {}", known.len(), scope.endpoint_link);

        let ctx = Arc::new(EnumerationContext::new(
            scope.clone(),
            known,
            deadline,
            self.config.link_timeout,
        ));

        let discovered = self
            .remote
            .discover(root)
            .await
            .map_err(|e| SyncError::Discovery {
                root: root.clone(),
                reason: format!("{:#}", e),
            })?;
        let ids: BTreeSet<RemoteIdentity> = discovered.into_iter().collect();
        info!("Discovered {} objects below {}", ids.len(), root);

        let mut per_kind: BTreeMap<EntityKind, usize> = BTreeMap::new();
        for id in &ids {
            *per_kind.entry(id.kind.entity_kind()).or_default() += 1;
        }
        for (kind, count) in per_kind {
            ctx.expect(TrackerKind::Entity(kind), count)?;
        }

        let (mut tally, fetched) = self.materialize(&ctx, ids, deadline).await;
        derive_flags(&ctx);

        let finished = if fetched {
            let (reconciled, finished) = self.reconcile_all(&ctx, deadline).await;
            tally += reconciled;
            finished
        } else {
            warn!("Fetch phase for {} hit the deadline, skipping reconciliation", scope.endpoint_link);
            tally += abandon_all(&ctx);
            false
        };

        for (kind, remaining) in ctx.undrained() {
            warn!("{} tracker still expects {} outcomes", kind, remaining);
        }

        let mut result = PassResult {
            created: tally.created,
            updated: tally.updated,
            errors: tally.errors,
            ..Default::default()
        };

        if finished {
            let report = cleanup_orphans(Arc::clone(&ctx), Arc::clone(&self.store)).await;
            result.deleted = report.deleted;
            result.retired = report.retired;
            result.errors += report.failed;
            result.orphan_links = report.orphan_links;
        } else {
            // Objects whose fetch or reconciliation was abandoned were never
            // touched; cleaning up now would delete live resources.
            warn!("Pass for {} hit its deadline, skipping orphan cleanup", scope.endpoint_link);
            result.orphan_links = list_orphans(&ctx, self.store.as_ref()).await;
        }

        info!(
            "Pass for {} done in {:?}: {} created, {} updated, {} errors, {} deleted, {} retired",
            scope.endpoint_link,
            started.elapsed(),
            result.created,
            result.updated,
            result.errors,
            result.deleted,
            result.retired
        );
        Ok(result)
    }

    /// Fetch properties for every discovered object and register overlays.
    /// Returns the tally and whether every fetch finished before `deadline`.
    async fn materialize(
        &self,
        ctx: &Arc<EnumerationContext>,
        ids: BTreeSet<RemoteIdentity>,
        deadline: Instant,
    ) -> (Tally, bool) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let mut pending: HashSet<RemoteIdentity> = ids.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for id in ids {
            let remote = Arc::clone(&self.remote);
            let ctx = Arc::clone(ctx);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let built = match permits.acquire_owned().await {
                    Ok(_permit) => fetch_overlay(remote.as_ref(), &id).await,
                    Err(e) => Err(SyncError::RetrievalFailure {
                        identity: id.clone(),
                        reason: e.to_string(),
                    }),
                };
                let tally = match built {
                    Ok(overlay) => {
                        ctx.register_overlay(Arc::new(overlay));
                        Tally::default()
                    }
                    Err(e) => {
                        warn!("Failed to materialize {}: {}", id, e);
                        ctx.record_or_log(&id, Outcome::Failed);
                        ctx.defer(&ctx.key_for(&id));
                        Tally::error()
                    }
                };
                (id, tally)
            });
        }

        let mut tally = Tally::default();
        let finished = loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((id, t)))) => {
                    pending.remove(&id);
                    tally += t;
                }
                Ok(Some(Err(e))) => warn!("Fetch task failed: {}", e),
                Ok(None) => break true,
                Err(_) => {
                    tasks.abort_all();
                    // Collect fetches that completed between the timeout and
                    // the abort so they are not failed twice.
                    while let Some(res) = tasks.join_next().await {
                        if let Ok((id, t)) = res {
                            pending.remove(&id);
                            tally += t;
                        }
                    }
                    warn!("Abandoning {} unfinished fetches", pending.len());
                    break false;
                }
            }
        };

        // Whatever is still pending was aborted or panicked.
        for id in pending {
            ctx.record_or_log(&id, Outcome::Failed);
            ctx.defer(&ctx.key_for(&id));
            tally += Tally::error();
        }
        (tally, finished)
    }

    /// Reconcile every overlay. Returns the tally and whether every task
    /// finished before `deadline`.
    async fn reconcile_all(&self, ctx: &Arc<EnumerationContext>, deadline: Instant) -> (Tally, bool) {
        let mut pending: HashSet<RemoteIdentity> = HashSet::new();
        let mut tasks = JoinSet::new();
        for overlay in ctx.overlays() {
            pending.insert(overlay.identity().clone());
            let ctx = Arc::clone(ctx);
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let tally = reconcile_object(&ctx, store.as_ref(), &overlay).await;
                (overlay.identity().clone(), tally)
            });
        }

        let mut tally = Tally::default();
        let finished = loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((id, t)))) => {
                    pending.remove(&id);
                    tally += t;
                }
                Ok(Some(Err(e))) => warn!("Reconcile task failed: {}", e),
                Ok(None) => break true,
                Err(_) => {
                    tasks.abort_all();
                    while let Some(res) = tasks.join_next().await {
                        if let Ok((id, t)) = res {
                            pending.remove(&id);
                            tally += t;
                        }
                    }
                    warn!("Abandoning {} unfinished reconciliations", pending.len());
                    break false;
                }
            }
        };

        // Aborted or panicked mid-write: the object may exist remotely and
        // locally, so it must not look like an orphan.
        for id in pending {
            ctx.defer(&ctx.key_for(&id));
            tally += Tally::error();
        }
        (tally, finished)
    }
}

async fn fetch_overlay(remote: &dyn RemoteInventory, id: &RemoteIdentity) -> Result<AnyOverlay> {
    let bag = remote
        .fetch_properties(id)
        .await
        .map_err(|e| SyncError::RetrievalFailure {
            identity: id.clone(),
            reason: format!("{:#}", e),
        })?;
    AnyOverlay::from_bag(bag, id.clone())
}

/// Fail every materialized overlay without reconciling it. Used when the
/// fetch phase already ran out the pass deadline.
fn abandon_all(ctx: &EnumerationContext) -> Tally {
    let mut tally = Tally::default();
    for overlay in ctx.overlays() {
        let id = overlay.identity();
        ctx.record_or_log(id, Outcome::Failed);
        ctx.defer(&ctx.key_for(id));
        tally += Tally::error();
    }
    tally
}

/// Set the write-once flags that depend on other overlays: cluster
/// membership of hosts and owner names of resource pools.
fn derive_flags(ctx: &EnumerationContext) {
    let overlays = ctx.overlays();

    let clustered: HashSet<RemoteIdentity> = overlays
        .iter()
        .filter_map(|o| o.as_compute())
        .filter(|c| c.is_cluster())
        .flat_map(|c| c.hosts())
        .collect();

    for overlay in &overlays {
        if let Some(host) = overlay.as_host() {
            host.mark_clustered(clustered.contains(host.identity()));
        }

        if let Some(pool) = overlay.as_resource_pool() {
            let Ok(owner) = pool.owner() else {
                continue;
            };
            match ctx.overlay(&owner).map(|o| o.name()) {
                Some(Ok(name)) => pool.attach_owner_name(name),
                _ => debug!("Owner {} of {} not materialized", owner, pool.identity()),
            }
        }
    }
}

//! Enumeration pass context - the state shared by every task of one pass.
//!
//! Created before the first remote fetch and dropped when the pass ends.
//! Everything in here is safe to use from many tasks at once; there is no
//! lock over the context as a whole.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::document::{EntityKind, PassScope};
use crate::error::{Result, SyncError};
use crate::key::{LocalKey, derive_key};
use crate::overlay::AnyOverlay;
use crate::remote::RemoteIdentity;
use crate::tracker::{CompletionTracker, Outcome};

/// What a tracker collects outcomes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    /// Reconciliation of one entity kind.
    Entity(EntityKind),
    /// Orphaned disks removed during cleanup.
    DeletedDisks,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerKind::Entity(kind) => write!(f, "{}", kind),
            TrackerKind::DeletedDisks => f.write_str("deleted_disk"),
        }
    }
}

/// Per-pass mutable state.
pub struct EnumerationContext {
    scope: PassScope,
    deadline: Instant,
    link_timeout: Duration,
    /// Everything materialized so far this pass.
    overlays: DashMap<RemoteIdentity, Arc<AnyOverlay>>,
    trackers: DashMap<TrackerKind, Arc<CompletionTracker>>,
    /// Known links not yet confirmed by this pass.
    still_present: DashSet<LocalKey>,
    /// Links whose remote object exists but failed to reconcile.
    deferred: DashSet<LocalKey>,
}

impl EnumerationContext {
    pub fn new(
        scope: PassScope,
        known_links: impl IntoIterator<Item = LocalKey>,
        deadline: Instant,
        link_timeout: Duration,
    ) -> Self {
        Self {
            scope,
            deadline,
            link_timeout,
            overlays: DashMap::new(),
            trackers: DashMap::new(),
            still_present: known_links.into_iter().collect(),
            deferred: DashSet::new(),
        }
    }

    pub fn scope(&self) -> &PassScope {
        &self.scope
    }

    pub fn endpoint_link(&self) -> &str {
        &self.scope.endpoint_link
    }

    /// Local key for a remote object of this pass's endpoint.
    pub fn key_for(&self, id: &RemoteIdentity) -> LocalKey {
        derive_key(id, &self.scope.endpoint_link)
    }

    /// Time left before the pass deadline.
    pub fn time_left(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// How long a dependent may wait for a parent's outcome.
    pub fn link_wait(&self) -> Duration {
        self.link_timeout.min(self.time_left())
    }

    // === Trackers ===

    /// Arm the tracker for `kind` with `count` expected outcomes.
    pub fn expect(&self, kind: TrackerKind, count: usize) -> Result<Arc<CompletionTracker>> {
        match self.trackers.entry(kind) {
            Entry::Occupied(_) => Err(SyncError::AlreadyArmed(kind.to_string())),
            Entry::Vacant(e) => {
                let tracker = Arc::new(CompletionTracker::new(kind.to_string(), count));
                e.insert(Arc::clone(&tracker));
                Ok(tracker)
            }
        }
    }

    pub fn tracker(&self, kind: TrackerKind) -> Option<Arc<CompletionTracker>> {
        self.trackers.get(&kind).map(|t| Arc::clone(t.value()))
    }

    /// Record the outcome for a remote object on its kind's tracker.
    pub fn record(&self, id: &RemoteIdentity, outcome: Outcome) -> Result<()> {
        let kind = TrackerKind::Entity(id.kind.entity_kind());
        let Some(tracker) = self.tracker(kind) else {
            warn!("No {} tracker armed, dropping outcome for {}", kind, id);
            return Ok(());
        };
        tracker.record(id.clone(), outcome)?;
        Ok(())
    }

    /// Like [`Self::record`], but a refused record is only logged.
    pub fn record_or_log(&self, id: &RemoteIdentity, outcome: Outcome) {
        if let Err(e) = self.record(id, outcome) {
            error!("Failed to record outcome for {}: {}", id, e);
        }
    }

    /// Trackers that still expect outcomes.
    pub fn undrained(&self) -> Vec<(TrackerKind, usize)> {
        self.trackers
            .iter()
            .filter(|t| !t.value().is_drained())
            .map(|t| (*t.key(), t.value().remaining()))
            .collect()
    }

    // === Overlays ===

    pub fn register_overlay(&self, overlay: Arc<AnyOverlay>) {
        self.overlays.insert(overlay.identity().clone(), overlay);
    }

    pub fn overlay(&self, id: &RemoteIdentity) -> Option<Arc<AnyOverlay>> {
        self.overlays.get(id).map(|o| Arc::clone(o.value()))
    }

    pub fn overlays(&self) -> Vec<Arc<AnyOverlay>> {
        self.overlays.iter().map(|o| Arc::clone(o.value())).collect()
    }

    /// Persisted key of a parent object, if it can be linked to.
    ///
    /// A parent materialized this pass is waited for (bounded by
    /// [`Self::link_wait`]). A parent this pass never materialized is only
    /// looked up, never waited for. Failed, missing or late parents give
    /// `None` and the dependent goes ahead without the link.
    pub async fn resolve_link(&self, parent: &RemoteIdentity) -> Option<LocalKey> {
        let tracker = self.tracker(TrackerKind::Entity(parent.kind.entity_kind()))?;
        let outcome = if self.overlays.contains_key(parent) {
            tracker.wait_for(parent, Some(self.link_wait())).await
        } else {
            tracker.lookup(parent)
        };
        match outcome {
            Some(Outcome::Linked(key)) => Some(key),
            Some(Outcome::Failed) => None,
            None => {
                if self.overlays.contains_key(parent) {
                    warn!("Gave up waiting for {}, linking without it", parent);
                }
                None
            }
        }
    }

    // === Still-present set ===

    /// Confirm `key` still exists remotely. Returns whether it was known.
    pub fn touch(&self, key: &LocalKey) -> bool {
        self.still_present.remove(key).is_some()
    }

    /// The remote object behind `key` exists but failed to reconcile; keep
    /// it out of orphan cleanup.
    pub fn defer(&self, key: &LocalKey) {
        self.still_present.remove(key);
        self.deferred.insert(key.clone());
    }

    /// Known links nothing in this pass touched, ordered.
    pub fn untouched(&self) -> Vec<LocalKey> {
        let mut links: Vec<LocalKey> = self.still_present.iter().map(|k| k.key().clone()).collect();
        links.sort();
        links
    }

    pub fn is_deferred(&self, key: &LocalKey) -> bool {
        self.deferred.contains(key)
    }

    pub fn deferred(&self) -> Vec<LocalKey> {
        let mut links: Vec<LocalKey> = self.deferred.iter().map(|k| k.key().clone()).collect();
        links.sort();
        links
    }
}

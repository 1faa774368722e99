//! Completion tracker - a single-use rendezvous for one entity kind.
//!
//! A tracker is armed with the number of outcomes it expects. Each
//! reconciliation task records exactly one outcome (a local key, or the
//! failure sentinel) for its remote object; dependents can look outcomes up
//! or block until a given key, or every key, has been recorded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::key::LocalKey;
use crate::remote::RemoteIdentity;

/// What reconciling one remote object produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Persisted under this key.
    Linked(LocalKey),
    /// Sentinel: reconciliation failed, dependents must not link to it.
    Failed,
}

impl Outcome {
    pub fn link(&self) -> Option<&LocalKey> {
        match self {
            Outcome::Linked(key) => Some(key),
            Outcome::Failed => None,
        }
    }
}

/// Records a tracker refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("{key} already recorded on {tracker} tracker")]
    Duplicate { tracker: String, key: RemoteIdentity },

    #[error("{tracker} tracker armed for {expected} outcomes, refusing {key}")]
    Overflow {
        tracker: String,
        expected: usize,
        key: RemoteIdentity,
    },
}

/// Counting rendezvous plus the outcomes recorded so far.
pub struct CompletionTracker {
    name: String,
    expected: usize,
    /// Records accepted so far; never exceeds `expected`.
    claimed: AtomicUsize,
    outcomes: DashMap<RemoteIdentity, Outcome>,
    remaining: watch::Sender<usize>,
}

impl CompletionTracker {
    /// Arm a tracker expecting `expected` outcomes.
    pub fn new(name: impl Into<String>, expected: usize) -> Self {
        let (remaining, _) = watch::channel(expected);
        Self {
            name: name.into(),
            expected,
            claimed: AtomicUsize::new(0),
            outcomes: DashMap::with_capacity(expected),
            remaining,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Outcomes still outstanding.
    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }

    /// Record the outcome for `key`.
    ///
    /// Each key may be recorded once, and at most `expected` keys in total.
    /// Refused records leave the remaining count untouched.
    pub fn record(&self, key: RemoteIdentity, outcome: Outcome) -> Result<(), TrackerError> {
        match self.outcomes.entry(key) {
            Entry::Occupied(e) => {
                return Err(TrackerError::Duplicate {
                    tracker: self.name.clone(),
                    key: e.key().clone(),
                });
            }
            Entry::Vacant(e) => {
                let expected = self.expected;
                if self
                    .claimed
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                        (c < expected).then_some(c + 1)
                    })
                    .is_err()
                {
                    return Err(TrackerError::Overflow {
                        tracker: self.name.clone(),
                        expected,
                        key: e.key().clone(),
                    });
                }
                debug!("{} tracker: recorded {} -> {:?}", self.name, e.key(), outcome);
                e.insert(outcome);
            }
        }

        // The outcome is visible before the count drops, so anyone woken by
        // the decrement finds it.
        self.remaining.send_modify(|r| *r = r.saturating_sub(1));
        Ok(())
    }

    /// Outcome recorded for `key`, if any.
    pub fn lookup(&self, key: &RemoteIdentity) -> Option<Outcome> {
        self.outcomes.get(key).map(|o| o.value().clone())
    }

    /// Wait until every expected outcome has been recorded.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn await_all(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.remaining.subscribe();
        let drained = async move {
            loop {
                if *rx.borrow_and_update() == 0 {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };

        match timeout {
            Some(t) => tokio::time::timeout(t, drained).await.is_ok(),
            None => {
                drained.await;
                true
            }
        }
    }

    /// Wait for the outcome of `key`.
    ///
    /// Returns as soon as `key` is recorded. Returns `None` when the tracker
    /// drains without it or `timeout` elapses.
    pub async fn wait_for(&self, key: &RemoteIdentity, timeout: Option<Duration>) -> Option<Outcome> {
        let mut rx = self.remaining.subscribe();
        let wait = async {
            loop {
                // Mark the current count seen before looking, so a record
                // landing in between still wakes us.
                let remaining = *rx.borrow_and_update();
                if let Some(outcome) = self.lookup(key) {
                    return Some(outcome);
                }
                if remaining == 0 || rx.changed().await.is_err() {
                    return self.lookup(key);
                }
            }
        };

        match timeout {
            Some(t) => match tokio::time::timeout(t, wait).await {
                Ok(outcome) => outcome,
                Err(_) => self.lookup(key),
            },
            None => wait.await,
        }
    }
}

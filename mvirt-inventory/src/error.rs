//! Sync error types.

use thiserror::Error;

use crate::remote::{ObjectKind, RemoteIdentity};
use crate::tracker::TrackerError;

/// Errors raised while reconciling one remote object or running a pass.
///
/// Apart from [`SyncError::Discovery`], none of these abort a pass: they are
/// isolated to the object that produced them and show up as an error
/// sentinel on that object's tracker entry.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Overlay built against an identity of the wrong kind.
    #[error("type mismatch: {identity} is not one of {expected:?}")]
    TypeMismatch {
        identity: RemoteIdentity,
        expected: &'static [ObjectKind],
    },

    /// A required property is absent from the fetched bag.
    #[error("missing property '{path}' on {identity}")]
    MissingProperty {
        identity: RemoteIdentity,
        path: String,
    },

    /// A property is present but cannot be read as the requested type.
    #[error("invalid property '{path}' on {identity}: {reason}")]
    InvalidProperty {
        identity: RemoteIdentity,
        path: String,
        reason: String,
    },

    /// Remote fetch or store read failed for a reason other than not-found.
    #[error("retrieval failed for {identity}: {reason}")]
    RetrievalFailure {
        identity: RemoteIdentity,
        reason: String,
    },

    /// Create or update of the persisted document failed.
    #[error("persist failed for {identity}: {reason}")]
    PersistFailure {
        identity: RemoteIdentity,
        reason: String,
    },

    /// Tracker rejected a record.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// A tracker for this kind was already armed in this pass.
    #[error("tracker for {0} already armed")]
    AlreadyArmed(String),

    /// The remote root could not be enumerated; the pass cannot start.
    #[error("discovery failed below {root}: {reason}")]
    Discovery {
        root: RemoteIdentity,
        reason: String,
    },
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

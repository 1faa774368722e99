pub mod cleanup;
pub mod context;
pub mod document;
pub mod error;
pub mod key;
pub mod overlay;
pub mod pass;
pub mod reconciler;
pub mod remote;
pub mod store;
pub mod tracker;

pub use context::{EnumerationContext, TrackerKind};
pub use document::{EntityKind, LifecycleState, PassScope, PowerState, ResourceDocument};
pub use error::{Result, SyncError};
pub use key::{LocalKey, derive_key};
pub use pass::{Enumerator, PassConfig, PassResult};
pub use remote::{ObjectKind, PropertyBag, RemoteIdentity, RemoteInventory, SnapshotInventory};
pub use store::{MemoryStore, ResourceStore, StoreError};
pub use tracker::{CompletionTracker, Outcome, TrackerError};

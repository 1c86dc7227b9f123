//! # Graphstore
//!
//! Persistent dependency graphs in an object store, guarded by session locks.
//!
//! The persistent graph records which stacks a namespace has deployed and
//! how they depend on each other. Reconciling it with the declared graph
//! finds stacks removed from configuration; those are destroyed in the
//! next deploy and pruned from the record.
//!
//! ## Example
//!
//! ```ignore
//! use graphstore::{GraphLocation, LocalStore, PersistentGraphStore, new_lock_code, reconcile};
//! use std::sync::Arc;
//!
//! let store = PersistentGraphStore::new(
//!     Arc::new(LocalStore::new("/var/lib/stackrun")),
//!     GraphLocation::new("deploy-state", "dev", "main"),
//! );
//! let persisted = store.load()?;
//! let guard = store.lock_manager().acquire(store.location(), &new_lock_code())?;
//! let changes = reconcile(&declared, &persisted);
//! // ... run the plan, saving with guard.lock_code() ...
//! guard.release()?;
//! ```

pub mod backend;
pub mod error;
pub mod location;
pub mod lock;
pub mod recorder;
pub mod store;

// Re-export main types at crate root
pub use backend::{LocalStore, MemoryStore, ObjectStore, Tags};
pub use error::{Error, Result};
pub use location::GraphLocation;
pub use lock::{LOCK_TAG, LockGuard, LockManager, new_lock_code};
pub use recorder::GraphRecorder;
pub use store::{
    PersistentGraphStore, Reconciliation, include_removals, reconcile, schedule_removals,
};

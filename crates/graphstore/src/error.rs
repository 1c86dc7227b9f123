use stackgraph::GraphError;
use thiserror::Error;

/// Errors from the object store, the persistent graph and its lock.
#[derive(Debug, Error)]
pub enum Error {
    /// Another session holds the lock
    #[error("persistent graph {location} is locked by another session (lock code {lock_code})")]
    PersistentGraphLocked { location: String, lock_code: String },

    /// The lock tag could not be written
    #[error("could not lock persistent graph {location}: {reason}")]
    PersistentGraphCannotLock { location: String, reason: String },

    /// A locked operation was attempted without holding the lock
    #[error("persistent graph {location} is not locked")]
    PersistentGraphUnlocked { location: String },

    /// The lock is held under a different code
    #[error("lock code mismatch for persistent graph {location}: locked with {held}, got {provided}")]
    PersistentGraphLockCodeMismatch {
        location: String,
        held: String,
        provided: String,
    },

    /// Unlocking failed; `source` says why
    #[error("could not unlock persistent graph {location}")]
    PersistentGraphCannotUnlock {
        location: String,
        #[source]
        source: Box<Error>,
    },

    /// The object does not exist
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Backend failure other than a missing object
    #[error("object store error: {0}")]
    Backend(String),

    /// The stored graph is not a valid dependency graph
    #[error("invalid persistent graph: {0}")]
    Graph(#[from] GraphError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the object was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. })
    }

    /// Returns true for errors about who holds the lock
    pub fn is_lock_conflict(&self) -> bool {
        match self {
            Self::PersistentGraphLocked { .. }
            | Self::PersistentGraphUnlocked { .. }
            | Self::PersistentGraphLockCodeMismatch { .. } => true,
            Self::PersistentGraphCannotUnlock { source, .. } => source.is_lock_conflict(),
            _ => false,
        }
    }
}

/// Result type for graph store operations
pub type Result<T> = std::result::Result<T, Error>;

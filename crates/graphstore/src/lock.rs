//! Session locks on the persistent graph object
//!
//! A lock is a single tag on the object whose value is the session's lock
//! code. Only the session that set the tag may remove it.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::ObjectStore;
use crate::error::{Error, Result};
use crate::location::GraphLocation;

/// Tag key holding the lock code
pub const LOCK_TAG: &str = "stackrun_lock_code";

/// Fresh random lock code for a session
pub fn new_lock_code() -> String {
    Uuid::new_v4().to_string()
}

/// Locks and unlocks persistent graph objects
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn ObjectStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Code the object is currently locked with, if any.
    ///
    /// A missing object is reported as unlocked.
    pub fn lock_code(&self, location: &GraphLocation) -> Result<Option<String>> {
        match self.store.get_tagging(location.bucket(), location.key()) {
            Ok(mut tags) => Ok(tags.remove(LOCK_TAG).filter(|code| !code.is_empty())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn is_locked(&self, location: &GraphLocation) -> Result<bool> {
        Ok(self.lock_code(location)?.is_some())
    }

    /// Lock the object with `lock_code`.
    ///
    /// Locking again with the code already held succeeds. The tag is
    /// claimed through [`ObjectStore::claim_tag`], so of two sessions
    /// racing for a free lock only one gets it.
    pub fn lock(&self, location: &GraphLocation, lock_code: &str) -> Result<()> {
        let held = self
            .store
            .claim_tag(location.bucket(), location.key(), LOCK_TAG, lock_code)
            .map_err(|err| Error::PersistentGraphCannotLock {
                location: location.to_string(),
                reason: err.to_string(),
            })?;
        if held != lock_code {
            return Err(Error::PersistentGraphLocked {
                location: location.to_string(),
                lock_code: held,
            });
        }
        log::info!("locked persistent graph {location}");
        Ok(())
    }

    /// Remove the lock held under `lock_code`.
    ///
    /// Succeeds without doing anything if the object no longer exists.
    pub fn unlock(&self, location: &GraphLocation, lock_code: &str) -> Result<()> {
        let cannot_unlock = |source: Error| Error::PersistentGraphCannotUnlock {
            location: location.to_string(),
            source: Box::new(source),
        };

        let mut tags = match self.store.get_tagging(location.bucket(), location.key()) {
            Ok(tags) => tags,
            Err(err) if err.is_not_found() => {
                log::debug!("persistent graph {location} no longer exists, nothing to unlock");
                return Ok(());
            }
            Err(err) => return Err(cannot_unlock(err)),
        };

        match tags.remove(LOCK_TAG).filter(|code| !code.is_empty()) {
            None => {
                return Err(cannot_unlock(Error::PersistentGraphUnlocked {
                    location: location.to_string(),
                }));
            }
            Some(held) if held != lock_code => {
                return Err(cannot_unlock(Error::PersistentGraphLockCodeMismatch {
                    location: location.to_string(),
                    held,
                    provided: lock_code.to_string(),
                }));
            }
            Some(_) => {}
        }

        let result = if tags.is_empty() {
            self.store.delete_tagging(location.bucket(), location.key())
        } else {
            self.store.put_tagging(location.bucket(), location.key(), &tags)
        };
        match result {
            Ok(()) => {}
            // Deleted between the read and the write
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(cannot_unlock(err)),
        }

        log::info!("unlocked persistent graph {location}");
        Ok(())
    }

    /// Lock and return a guard that unlocks when released or dropped
    pub fn acquire(&self, location: &GraphLocation, lock_code: &str) -> Result<LockGuard> {
        self.lock(location, lock_code)?;
        Ok(LockGuard {
            manager: self.clone(),
            location: location.clone(),
            lock_code: lock_code.to_string(),
            released: false,
        })
    }
}

/// Held lock on a persistent graph.
///
/// Call [`LockGuard::release`] to see unlock errors. Dropping an unreleased
/// guard unlocks too, logging failures instead of returning them.
pub struct LockGuard {
    manager: LockManager,
    location: GraphLocation,
    lock_code: String,
    released: bool,
}

impl LockGuard {
    pub fn lock_code(&self) -> &str {
        &self.lock_code
    }

    pub fn location(&self) -> &GraphLocation {
        &self.location
    }

    /// Unlock now and report the result
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.unlock(&self.location, &self.lock_code)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.manager.unlock(&self.location, &self.lock_code) {
            log::warn!("failed to release lock on {}: {err}", self.location);
        }
    }
}

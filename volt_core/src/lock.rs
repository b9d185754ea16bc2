//! Process-wide per-key locking.
//!
//! Mutating operations (PUT, PATCH, DELETE, UNLINK, REBALANCE) must hold a
//! key's lock for their whole duration; a failed acquisition surfaces to the
//! client as a 409. Reads never lock. The registry is just a concurrent set
//! of currently-locked keys. There is no queueing, the loser retries.

use dashmap::DashSet;

/// The set of currently locked keys.
#[derive(Debug, Default)]
pub struct KeyLocks {
    keys: DashSet<Vec<u8>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to lock `key`. Returns `None` if it is already locked by an
    /// in-flight operation; otherwise the returned guard holds the lock
    /// until dropped.
    pub fn try_lock(&self, key: &[u8]) -> Option<KeyLockGuard<'_>> {
        if self.keys.insert(key.to_vec()) {
            Some(KeyLockGuard {
                locks: self,
                key: key.to_vec(),
            })
        } else {
            None
        }
    }

    /// True if `key` is currently locked.
    pub fn is_locked(&self, key: &[u8]) -> bool {
        self.keys.contains(key)
    }
}

/// Holds a key's lock; dropping it unlocks.
#[must_use = "dropping the guard releases the key lock"]
pub struct KeyLockGuard<'a> {
    locks: &'a KeyLocks,
    key: Vec<u8>,
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.keys.remove(&self.key);
    }
}

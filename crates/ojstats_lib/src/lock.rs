//! The per-user update lock: a TTL-backed mutual-exclusion registry.
//!
//! The lock guarantees at most one in-flight persistence writer per user. A second
//! concurrent attempt is told "skipped", never queued. The TTL, equal to the maximum
//! allowed refresh duration, is a safety net against a crashed holder leaking the
//! lock forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mkenv::prelude::*;

struct LockEntry {
    holder: String,
    deadline: Instant,
}

/// The TTL-backed mutual-exclusion registry.
///
/// All the attempts are serialized behind one coarse lock guarding the TTL map;
/// the map operations are cheap.
pub struct UpdateLocks {
    ttl: Duration,
    entries: Mutex<HashMap<String, LockEntry>>,
}

/// Returns the update-lock key of a user.
pub fn update_lock_key(user_id: u64) -> String {
    format!("oj_update_lock:{user_id}")
}

impl UpdateLocks {
    /// Creates a new registry with the provided entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a new registry from the global library environment.
    pub fn from_env() -> Self {
        Self::new(crate::env().async_update_timeout.get())
    }

    /// Tries to acquire the lock with the provided key.
    ///
    /// Atomically checks the registry: if the key is absent (or its entry has expired),
    /// inserts a new entry tagged with a random holder token and returns `true`;
    /// otherwise returns `false`.
    pub fn try_lock(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get(key) {
            Some(entry) if entry.deadline > now => {
                tracing::debug!("lock `{key}` already held by {}", entry.holder);
                false
            }
            _ => {
                let holder = crate::gen_random_str(16);
                tracing::debug!("lock `{key}` acquired by {holder}");
                entries.insert(
                    key.to_owned(),
                    LockEntry {
                        holder,
                        deadline: now + self.ttl,
                    },
                );
                true
            }
        }
    }

    /// Releases the lock with the provided key, unconditionally.
    pub fn release(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        tracing::debug!("lock `{key}` released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn try_lock_is_exclusive() {
        let locks = Arc::new(UpdateLocks::new(Duration::from_secs(60)));
        let key = update_lock_key(42);

        let acquired = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let acquired = Arc::clone(&acquired);
                let key = key.clone();
                std::thread::spawn(move || {
                    if locks.try_lock(&key) {
                        acquired.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_allows_reacquisition() {
        let locks = UpdateLocks::new(Duration::from_secs(60));
        assert!(locks.try_lock("k"));
        assert!(!locks.try_lock("k"));
        locks.release("k");
        assert!(locks.try_lock("k"));
    }

    #[test]
    fn expired_entry_counts_as_absent() {
        let locks = UpdateLocks::new(Duration::from_millis(20));
        assert!(locks.try_lock("k"));
        assert!(!locks.try_lock("k"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(locks.try_lock("k"));
    }

    #[test]
    fn keys_are_independent() {
        let locks = UpdateLocks::new(Duration::from_secs(60));
        assert!(locks.try_lock(&update_lock_key(1)));
        assert!(locks.try_lock(&update_lock_key(2)));
    }
}

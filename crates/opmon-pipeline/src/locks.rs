//! Async mutual exclusion keyed by value.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

#[derive(Debug)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    holders: usize,
}

/// One async lock per key. A key's entry lives only while some caller holds
/// or waits for it.
#[derive(Debug)]
pub(crate) struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

/// Exclusive access to one key; released on drop, including when the
/// acquiring future is cancelled while still waiting.
#[derive(Debug)]
pub(crate) struct KeyLease<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) async fn acquire(&self, key: K) -> KeyLease<'_, K> {
        let lock = self.checkout(&key);
        let mut lease = KeyLease {
            locks: self,
            key,
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    fn checkout(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            lock: Arc::default(),
            holders: 0,
        });
        slot.holders += 1;
        Arc::clone(&slot.lock)
    }

    fn checkin(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(key) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                slots.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyLease<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.checkin(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn entry_is_removed_after_release() {
        let locks = KeyedLocks::default();
        let lease = locks.acquire(1_i64).await;
        assert_eq!(locks.len(), 1);
        drop(lease);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_an_entry() {
        let locks = KeyedLocks::default();
        let held = locks.acquire(7_i64).await;

        let waited = tokio::time::timeout(Duration::from_millis(20), locks.acquire(7)).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks = KeyedLocks::default();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_holders_never_overlap() {
        let locks = Arc::new(KeyedLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _lease = locks.acquire(42_i64).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }
}

//! Per-key mutual exclusion

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// One mutex per key, created on first use and dropped once no caller holds
/// or waits for it.
///
/// Holders of the same key run one at a time; different keys never contend.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` while holding the lock for `key`
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        // Clone the Arc so the map shard is not held while `f` runs
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);

        // Only the map's own reference left: nobody is waiting on this key
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    locks.with("acct", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_unused_keys_are_dropped() {
        let locks = KeyedLocks::new();
        for i in 0..100 {
            let key = format!("entry-{}", i);
            let held = locks.with(&key, || locks.len());
            assert_eq!(held, 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_nested_keys() {
        let locks = KeyedLocks::new();
        let inner = locks.with("a", || locks.with("b", || locks.len()));
        assert_eq!(inner, 2);
        assert_eq!(locks.len(), 0);
    }
}

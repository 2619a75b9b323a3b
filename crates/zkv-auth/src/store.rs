//! Expiring key/value store for login challenges and session tokens
//!
//! Entries carry an absolute deadline. Lookups treat an expired entry as
//! absent even before a sweep has removed it. Every `SWEEP_EVERY`th `put`
//! sweeps, so a flood of inserts costs amortised O(1) each while dead entries
//! stay bounded between background sweeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// TTL-bounded map keyed by opaque strings.
pub trait ExpiringStore<V>: Send + Sync {
    /// Insert or replace `key`, expiring `ttl` from now.
    fn put(&self, key: String, value: V, ttl: Duration);

    /// A copy of the live value under `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Atomically remove and return the live value under `key`.
    ///
    /// Of two concurrent callers for the same key, at most one sees `Some`.
    fn delete(&self, key: &str) -> Option<V>;

    /// Drop every entry. Returns how many were live.
    fn clear(&self) -> usize;

    /// Drop expired entries. Returns how many were removed.
    fn sweep(&self) -> usize;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Inserts between opportunistic sweeps in `MemoryStore::put`.
const SWEEP_EVERY: usize = 64;

/// In-process `ExpiringStore` behind a single mutex.
pub struct MemoryStore<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    puts: AtomicUsize,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn sweep_locked<V>(map: &mut HashMap<String, Entry<V>>, now: Instant) -> usize {
    let before = map.len();
    map.retain(|_, entry| entry.is_live(now));
    before - map.len()
}

impl<V: Clone + Send> ExpiringStore<V> for MemoryStore<V> {
    fn put(&self, key: String, value: V, ttl: Duration) {
        let now = Instant::now();
        let due = (self.puts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0;
        let mut map = self.lock();
        if due {
            sweep_locked(&mut map, now);
        }
        map.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<V> {
        let map = self.lock();
        map.get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone())
    }

    fn delete(&self, key: &str) -> Option<V> {
        let entry = self.lock().remove(key)?;
        entry.is_live(Instant::now()).then_some(entry.value)
    }

    fn clear(&self) -> usize {
        let now = Instant::now();
        let mut map = self.lock();
        let live = map.values().filter(|e| e.is_live(now)).count();
        map.clear();
        live
    }

    fn sweep(&self) -> usize {
        sweep_locked(&mut self.lock(), Instant::now())
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }
}

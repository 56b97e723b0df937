//! Keyed TTL store for closable handles.
//!
//! Entries live until their deadline passes and a [`Pool::gc`] sweep
//! collects them, at which point the handle's `close` runs exactly once.
//! [`Pool::get_and_renew`] pushes the deadline forward without blocking
//! concurrent readers: the deadline is a single word updated atomically, so
//! readers always observe a valid timestamp. Higher layers use this for
//! pending requests and other connection-scoped resources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// A handle that can be closed when its pool entry expires.
pub trait Poolable: Send + Sync {
    /// Releases the handle. Invoked at most once, on eviction only.
    fn close(&self);
}

/// Per-entry configuration.
#[derive(Debug, Clone, Copy)]
pub struct EntryConfig {
    /// How long the entry lives past insertion or renewal.
    pub alive_for: Duration,
}

struct Entry {
    /// Deadline in nanoseconds from the pool epoch. Only ever moves forward.
    expires_at: AtomicU64,
    alive_for: Duration,
    handle: Arc<dyn Poolable>,
}

/// Keyed store of closable handles with per-entry expiration.
pub struct Pool {
    epoch: Instant,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl Pool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn deadline(&self, alive_for: Duration) -> u64 {
        (self.epoch.elapsed() + alive_for).as_nanos() as u64
    }

    /// Inserts a handle under `key`, replacing any previous entry.
    ///
    /// A replaced entry is dropped without its `close` being invoked; the
    /// caller owns handles it overwrites.
    pub fn add(&self, key: impl Into<String>, handle: Arc<dyn Poolable>, config: EntryConfig) {
        let entry = Arc::new(Entry {
            expires_at: AtomicU64::new(self.deadline(config.alive_for)),
            alive_for: config.alive_for,
            handle,
        });
        self.entries.write().insert(key.into(), entry);
    }

    /// Looks up a handle without touching its deadline.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Poolable>> {
        self.entries.read().get(key).map(|e| e.handle.clone())
    }

    /// Looks up a handle and pushes its deadline to now + `alive_for`.
    pub fn get_and_renew(&self, key: &str) -> Option<Arc<dyn Poolable>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        entry
            .expires_at
            .store(self.deadline(entry.alive_for), Ordering::Release);
        Some(entry.handle.clone())
    }

    /// Deletes an entry without invoking `close`.
    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Sweeps expired entries and closes their handles.
    ///
    /// Two phases: snapshot the expired (key, entry) pairs under the read
    /// lock, then delete each under the write lock only if the same entry
    /// is still present and still expired. An entry renewed or replaced
    /// between the phases is left alone, so a handle is closed at most
    /// once and never after a renewal.
    pub fn gc(&self) {
        let expired: Vec<(String, Arc<Entry>)> = {
            let now = self.now();
            self.entries
                .read()
                .iter()
                .filter(|(_, entry)| entry.expires_at.load(Ordering::Acquire) < now)
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect()
        };

        for (key, snapshot) in expired {
            let removed = {
                let mut entries = self.entries.write();
                let now = self.now();
                match entries.get(&key) {
                    Some(current)
                        if Arc::ptr_eq(current, &snapshot)
                            && current.expires_at.load(Ordering::Acquire) < now =>
                    {
                        entries.remove(&key)
                    }
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                entry.handle.close();
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

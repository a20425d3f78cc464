use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Tracks in-flight license server operations by request key.
///
/// At most one operation may hold a given key. A second acquire attempt
/// fails immediately; nothing is ever queued.
#[derive(Debug, Clone, Default)]
pub struct RequestDeduplicator {
    /// Held key to the generation of its current holder.
    in_flight: Arc<DashMap<String, u64>>,
    next_generation: Arc<AtomicU64>,
}

impl RequestDeduplicator {
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `key` as in flight. Returns `false` if it already is.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.claim(key).is_some()
    }

    fn claim(&self, key: &str) -> Option<u64> {
        match self.in_flight.entry(key.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                vacant.insert(generation);
                Some(generation)
            }
        }
    }

    /// Clear the in-flight mark for `key`, whoever holds it. A guard for the
    /// released hold will not clear a later holder's mark when it drops.
    pub fn release(&self, key: &str) {
        self.in_flight.remove(key);
    }

    /// Acquire `key` for the lifetime of the returned guard.
    ///
    /// The key is released when the guard drops, including on early return
    /// or panic unwinding.
    pub fn acquire(&self, key: &str) -> Option<InFlightGuard> {
        self.claim(key).map(|generation| InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_owned(),
            generation,
        })
    }

    /// Whether `key` is currently held.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether no key is held.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Scoped hold on a [`RequestDeduplicator`] key.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<DashMap<String, u64>>,
    key: String,
    generation: u64,
}

impl InFlightGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.in_flight
            .remove_if(&self.key, |_, holder| *holder == generation);
    }
}

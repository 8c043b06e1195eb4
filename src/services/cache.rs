//! In-process result cache: bounded LRU with per-entry TTL.
//!
//! Entries live in an index-linked arena so promotion and eviction stay
//! O(1); a hash map indexes keys into the arena. One mutex guards the whole
//! structure, which is plenty for a cache this size. Expired entries are
//! dropped lazily on read and by the optional background sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::CacheConfig;

const NIL: usize = usize::MAX;

struct Slot<V> {
    key: String,
    value: V,
    expires_at: Instant,
    prev: usize,
    next: usize,
}

struct Inner<V> {
    map: HashMap<String, usize>,
    slots: Vec<Option<Slot<V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: usize,
    /// Least recently used, evicted first.
    tail: usize,
}

impl<V> Inner<V> {
    fn slot(&self, idx: usize) -> &Slot<V> {
        self.slots[idx].as_ref().expect("indexed slot is occupied")
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot<V> {
        self.slots[idx].as_mut().expect("indexed slot is occupied")
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slot(idx);
            (slot.prev, slot.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.slot_mut(prev).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slot_mut(next).prev = prev;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(idx);
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head == NIL {
            self.tail = idx;
        } else {
            self.slot_mut(old_head).prev = idx;
        }
        self.head = idx;
    }

    fn remove_entry(&mut self, idx: usize) {
        self.detach(idx);
        if let Some(slot) = self.slots[idx].take() {
            self.map.remove(&slot.key);
        }
        self.free.push(idx);
    }
}

/// Thread-safe LRU cache with TTL semantics.
///
/// A miss is always safe: callers recompute and re-insert.
pub struct ResultCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone + Send + 'static> ResultCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                slots: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, Duration::from_secs(config.ttl_secs))
    }

    /// Fetch a live entry, promoting it to most recently used.
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let idx = *inner.map.get(key)?;
        if inner.slot(idx).expires_at <= Instant::now() {
            inner.remove_entry(idx);
            return None;
        }
        inner.detach(idx);
        inner.push_front(idx);
        Some(inner.slot(idx).value.clone())
    }

    /// Store under the default TTL.
    pub fn insert(&self, key: String, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Store with an explicit TTL, evicting the least recently used entry
    /// when the cache is full.
    pub fn insert_with_ttl(&self, key: String, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut inner = self.lock();

        if let Some(&idx) = inner.map.get(&key) {
            {
                let slot = inner.slot_mut(idx);
                slot.value = value;
                slot.expires_at = expires_at;
            }
            inner.detach(idx);
            inner.push_front(idx);
            return;
        }

        if inner.map.len() >= self.capacity {
            let tail = inner.tail;
            inner.remove_entry(tail);
        }

        let slot = Slot {
            key: key.clone(),
            value,
            expires_at,
            prev: NIL,
            next: NIL,
        };
        let idx = match inner.free.pop() {
            Some(idx) => {
                inner.slots[idx] = Some(slot);
                idx
            }
            None => {
                inner.slots.push(Some(slot));
                inner.slots.len() - 1
            }
        };
        inner.map.insert(key, idx);
        inner.push_front(idx);
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.lock();
        match inner.map.get(key) {
            Some(&idx) => {
                inner.remove_entry(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.slots.clear();
        inner.free.clear();
        inner.head = NIL;
        inner.tail = NIL;
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Some(s) if s.expires_at <= now => Some(idx),
                _ => None,
            })
            .collect();
        for idx in &expired {
            inner.remove_entry(*idx);
        }
        expired.len()
    }

    /// Periodically sweep in the background so the cache stays bounded even
    /// without reads. The task stops once the cache itself is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "cache sweep dropped expired entries");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

//! Bounded key/value cache whose entries expire a fixed time after they were
//! written. When full, the entry written longest ago makes room.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    max_entries: usize,
    ttl: Duration,
    entries: HashMap<K, (V, Instant)>,
    // keys in write order, oldest first
    written: VecDeque<K>,
}

impl<K: Hash + Eq + Clone, V: Clone> ExpiringCache<K, V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            entries: HashMap::new(),
            written: VecDeque::new(),
        }
    }
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
    /// Includes expired entries that were not purged yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let (value, written_at) = self.entries.get(key)?;
        if now.saturating_duration_since(*written_at) < self.ttl {
            return Some(value.clone());
        }
        self.remove(key);
        None
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now())
    }
    pub fn insert_at(&mut self, key: K, value: V, now: Instant) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.written.retain(|k| k != &key);
        } else {
            self.purge_expired(now);
            while self.entries.len() >= self.max_entries {
                match self.written.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.written.push_back(key.clone());
        self.entries.insert(key, (value, now));
    }

    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, written_at)| now.saturating_duration_since(*written_at) < ttl);
        let entries = &self.entries;
        self.written.retain(|k| entries.contains_key(k));
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
        self.written.retain(|k| k != key);
    }
}

//! Process-local graph cache.
//!
//! Bounded by entry count, expired by insertion age. Expiry is evaluated
//! lazily on lookup; nothing is evicted proactively. The cache is
//! independent from the durable copies and safe to lose.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::builder::KnowledgeGraph;

pub const DEFAULT_CAPACITY: usize = 5;
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct CacheEntry {
    graph: KnowledgeGraph,
    inserted_at: Instant,
}

pub struct GraphCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl GraphCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Returns a clone of the cached graph, or `None` when absent or older
    /// than the TTL. An expired entry is dropped on the way out.
    pub fn get(&self, id: &str) -> Option<KnowledgeGraph> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.graph.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Inserts a graph, evicting the oldest-inserted entry when full.
    pub fn insert(&self, id: impl Into<String>, graph: KnowledgeGraph) {
        let id = id.into();
        let mut entries = self.entries.lock().unwrap();

        if !entries.contains_key(&id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(
            id,
            CacheEntry {
                graph,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, id: &str) {
        self.entries.lock().unwrap().remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

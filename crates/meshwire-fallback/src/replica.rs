use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// One cached copy of a remote record.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// When this entry was created or last overwritten.
    pub updated_at: Instant,
}

/// A shared map of remote-entity id to the last seen copy of the
/// record.
///
/// Entries are overwritten in place per id, in event arrival order
/// (last write wins); re-applying the same event is a no-op beyond
/// rewriting identical data, which is what makes at-least-once
/// consumption safe. Entries are never expired or evicted — the cache
/// grows with the number of distinct ids seen, a deliberate scope
/// limitation of this design.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Debug)]
pub struct ReplicaCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
}

impl<V> Clone for ReplicaCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ReplicaCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ReplicaCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stores or overwrites the entry for `id`.
    ///
    /// Only the event consumer should call this; the call path treats
    /// the cache as read-only.
    pub fn insert(&self, id: impl Into<String>, value: V) {
        let mut entries = self.entries.write().expect("replica cache lock poisoned");
        entries.insert(
            id.into(),
            CacheEntry {
                value,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("replica cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ReplicaCache<V> {
    /// Returns a copy of the entry for `id`, if one has ever been
    /// consumed.
    pub fn get(&self, id: &str) -> Option<CacheEntry<V>> {
        self.entries
            .read()
            .expect("replica cache lock poisoned")
            .get(id)
            .cloned()
    }
}

//! # Ordered map shared between tokio tasks.
//!
//! [`SharedMap`] wraps a [`BTreeMap`] in a [`parking_lot::RwLock`]. Every method
//! takes the lock for exactly one operation, so single-key reads and writes are
//! atomic while iteration works on snapshots. The lock is never held across an
//! `.await`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Cloneable handle to a shared, ordered key→value map.
#[derive(Debug)]
pub struct SharedMap<K, V> {
    inner: Arc<RwLock<BTreeMap<K, V>>>,
}

impl<K, V> Clone for SharedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Ord + Clone, V: Clone> SharedMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Inserts a value, returning the previous one for that key.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Removes a key, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Returns a clone of the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Sorted snapshot of the keys.
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }

    /// Sorted snapshot of the entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Removes every entry matching `pred` and returns them.
    pub fn remove_where(&self, mut pred: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let mut map = self.inner.write();
        let doomed: Vec<K> = map
            .iter()
            .filter(|(k, v)| pred(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| map.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Empties the map and returns what it held.
    pub fn drain(&self) -> Vec<(K, V)> {
        std::mem::take(&mut *self.inner.write()).into_iter().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True if the map holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<K: Ord + Clone, V: Clone> Default for SharedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted_snapshots() {
        let map = SharedMap::new();
        map.insert(30, "c");
        map.insert(10, "a");
        map.insert(20, "b");

        assert_eq!(map.keys(), vec![10, 20, 30]);
        assert_eq!(map.get(&20), Some("b"));
    }

    #[test]
    fn remove_where_takes_only_matches() {
        let map = SharedMap::new();
        map.insert("1__a".to_string(), 1);
        map.insert("2__b".to_string(), 2);
        map.insert("3__a".to_string(), 3);

        let removed = map.remove_where(|k, _| k.ends_with("__a"));
        assert_eq!(removed.len(), 2);
        assert_eq!(map.keys(), vec!["2__b".to_string()]);
    }

    #[test]
    fn drain_empties_every_clone() {
        let map = SharedMap::new();
        let view = map.clone();
        map.insert("x".to_string(), 1);

        assert_eq!(view.drain().len(), 1);
        assert!(map.is_empty());
    }
}

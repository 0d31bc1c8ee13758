//! Per-factory derived metadata.
//!
//! Both caches are plain objects owned by (or injected into) a factory.
//! They are safe to share across threads; a poisoned lock is recovered
//! since the maps only ever hold fully built entries.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, RwLock, Weak};

// ============================================================================
// FactoryMetadataCache
// ============================================================================

/// Compute-if-absent map from a factory key to metadata derived from it.
///
/// ```
/// use omkit_session::FactoryMetadataCache;
///
/// let cache: FactoryMetadataCache<String, usize> = FactoryMetadataCache::new();
/// let first = cache.get_or_compute("orders", |name| name.len());
/// let second = cache.get_or_compute("orders", |_| unreachable!());
/// assert_eq!(first, second);
/// ```
pub struct FactoryMetadataCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for FactoryMetadataCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> FactoryMetadataCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value for `key`, computing and storing it on first use.
    ///
    /// `compute` runs under the write lock, so it runs at most once per key
    /// and must not reenter this cache.
    pub fn get_or_compute<Q>(&self, key: Q, compute: impl FnOnce(&K) -> V) -> V
    where
        Q: Into<K>,
    {
        let key = key.into();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(value) = entries.get(&key) {
                return value.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(key)
            .or_insert_with_key(|key| {
                tracing::debug!("Computing factory metadata");
                compute(key)
            })
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Drop the entry for `key`, so the next lookup recomputes it.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl<K, V> fmt::Debug for FactoryMetadataCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.entries.read().map_or(0, |e| e.len());
        f.debug_struct("FactoryMetadataCache").field("len", &len).finish()
    }
}

// ============================================================================
// WeakFlagCache
// ============================================================================

/// Boolean memo keyed by object identity.
///
/// Entries hold only a [`Weak`], so caching never keeps a target alive.
/// Dead entries are purged whenever a new flag is stored.
pub struct WeakFlagCache<T> {
    entries: RwLock<HashMap<usize, (Weak<T>, bool)>>,
}

impl<T> Default for WeakFlagCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> WeakFlagCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(target: &Arc<T>) -> usize {
        Arc::as_ptr(target).cast::<()>() as usize
    }

    /// The memoized flag for `target`, computing it on first use.
    pub fn get_or_compute(&self, target: &Arc<T>, compute: impl FnOnce(&T) -> bool) -> bool {
        let key = Self::key(target);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(flag) = Self::live_flag(&entries, key, target) {
                return flag;
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(flag) = Self::live_flag(&entries, key, target) {
            return flag;
        }
        let before = entries.len();
        entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        if entries.len() < before {
            tracing::trace!(purged = before - entries.len(), "Purged dead flag entries");
        }
        let flag = compute(target);
        entries.insert(key, (Arc::downgrade(target), flag));
        flag
    }

    fn live_flag(entries: &HashMap<usize, (Weak<T>, bool)>, key: usize, target: &Arc<T>) -> Option<bool> {
        entries
            .get(&key)
            .filter(|(weak, _)| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(target)))
            .map(|(_, flag)| *flag)
    }

    /// Entries, including ones whose target has died since the last purge.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for WeakFlagCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.entries.read().map_or(0, |e| e.len());
        f.debug_struct("WeakFlagCache").field("len", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

    #[test]
    fn test_compute_if_absent() {
        let cache: FactoryMetadataCache<String, Arc<String>> = FactoryMetadataCache::new();
        let calls = Cell::new(0);
        let a = cache.get_or_compute("a", |k| {
            calls.set(calls.get() + 1);
            Arc::new(k.to_uppercase())
        });
        let again = cache.get_or_compute("a", |_| {
            calls.set(calls.get() + 1);
            Arc::new(String::new())
        });
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.get(&"a".to_string()).as_deref().map(String::as_str), Some("A"));

        cache.invalidate(&"a".to_string());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_compute_runs_once_per_key() {
        let cache: Arc<FactoryMetadataCache<u32, u32>> = Arc::new(FactoryMetadataCache::new());
        let computed = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let computed = Arc::clone(&computed);
                thread::spawn(move || {
                    cache.get_or_compute(7_u32, |k| {
                        computed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        k * 2
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 14);
        }
        assert_eq!(computed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_weak_flag_memoizes_by_identity() {
        let cache = WeakFlagCache::new();
        let a = Arc::new(5);
        let b = Arc::new(5);
        assert!(cache.get_or_compute(&a, |v| *v > 3));
        assert!(cache.get_or_compute(&a, |_| false));
        assert!(!cache.get_or_compute(&b, |_| false));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_weak_flag_purges_dead_targets() {
        let cache = WeakFlagCache::new();
        let short = Arc::new(String::from("gone"));
        cache.get_or_compute(&short, |_| true);
        drop(short);
        assert_eq!(cache.len(), 1);

        let kept = Arc::new(String::from("kept"));
        cache.get_or_compute(&kept, |_| true);
        assert_eq!(cache.len(), 1);
    }
}

//! Plan caching for compiled criteria queries.
//!
//! Building the same criteria tree twice produces the same JPQL, so
//! compiled plans are kept under a structural hash of the query and the
//! compiler options.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use omkit_core::Result;

use crate::config::CompilerConfig;
use crate::compiler::CompiledQuery;
use crate::criteria::CriteriaQuery;

#[derive(Debug, Clone)]
struct CachedPlan {
    plan: Arc<CompiledQuery>,
    last_used: u64,
    hit_count: u64,
}

/// LRU cache of compiled queries.
///
/// ```
/// use omkit_query::{CompilerConfig, CriteriaQuery, QueryPlanCache, plan_key};
///
/// let mut q = CriteriaQuery::new();
/// q.from("Employee");
/// let key = plan_key(&q, &CompilerConfig::default());
///
/// let mut cache = QueryPlanCache::new(16);
/// assert!(!cache.contains(key));
/// ```
#[derive(Debug)]
pub struct QueryPlanCache {
    plans: HashMap<u64, CachedPlan>,
    max_size: usize,
    clock: u64,
}

impl QueryPlanCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            plans: HashMap::with_capacity(max_size.min(256)),
            max_size: max_size.max(1),
            clock: 0,
        }
    }

    /// Return the cached plan for `key`, compiling it with `compile` on a
    /// miss. A failed compilation is not cached.
    pub fn get_or_try_insert(
        &mut self,
        key: u64,
        compile: impl FnOnce() -> Result<CompiledQuery>,
    ) -> Result<Arc<CompiledQuery>> {
        self.clock += 1;
        if let Some(entry) = self.plans.get_mut(&key) {
            entry.last_used = self.clock;
            entry.hit_count += 1;
            tracing::debug!(key, hits = entry.hit_count, "Plan cache hit");
            return Ok(Arc::clone(&entry.plan));
        }

        let plan = Arc::new(compile()?);
        if self.plans.len() >= self.max_size {
            self.evict_lru();
        }
        tracing::debug!(key, size = self.plans.len() + 1, "Plan cache miss");
        self.plans.insert(
            key,
            CachedPlan {
                plan: Arc::clone(&plan),
                last_used: self.clock,
                hit_count: 0,
            },
        );
        Ok(plan)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.plans.contains_key(&key)
    }

    /// Times the plan under `key` was served from the cache.
    pub fn hit_count(&self, key: u64) -> Option<u64> {
        self.plans.get(&key).map(|e| e.hit_count)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&mut self) {
        self.plans.clear();
    }

    fn evict_lru(&mut self) {
        if let Some((&lru_key, _)) = self.plans.iter().min_by_key(|(_, entry)| entry.last_used) {
            tracing::trace!(key = lru_key, "Evicting cached plan");
            self.plans.remove(&lru_key);
        }
    }
}

impl Default for QueryPlanCache {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Structural cache key for compiling `query` under `config`.
///
/// Queries built the same way share a key even though their nodes belong
/// to different query instances.
pub fn plan_key(query: &CriteriaQuery, config: &CompilerConfig) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    query.hash(&mut hasher);
    config.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::JoinType;
    use std::cell::Cell;

    fn plan(jpql: &str) -> CompiledQuery {
        CompiledQuery {
            jpql: jpql.to_string(),
            literals: Vec::new(),
            paths: Vec::new(),
        }
    }

    #[test]
    fn test_cache_hit() {
        let mut cache = QueryPlanCache::new(10);
        let first = cache.get_or_try_insert(1, || Ok(plan("select a0"))).unwrap();

        let called = Cell::new(false);
        let second = cache
            .get_or_try_insert(1, || {
                called.set(true);
                Ok(plan("other"))
            })
            .unwrap();
        assert!(!called.get());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hit_count(1), Some(1));
    }

    #[test]
    fn test_failed_compile_not_cached() {
        let mut cache = QueryPlanCache::new(10);
        let err = cache.get_or_try_insert(7, || {
            Err(omkit_core::Error::query(
                omkit_core::QueryErrorKind::EmptySelection,
                "nothing",
            ))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = QueryPlanCache::new(2);
        cache.get_or_try_insert(1, || Ok(plan("1"))).unwrap();
        cache.get_or_try_insert(2, || Ok(plan("2"))).unwrap();
        cache.get_or_try_insert(1, || Ok(plan("1"))).unwrap();
        cache.get_or_try_insert(3, || Ok(plan("3"))).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_plan_key_is_structural() {
        let build = |attribute: &str| {
            let mut q = CriteriaQuery::new();
            let e = q.from("Employee");
            let d = q.join(e, "department", JoinType::Left);
            q.select(e).filter(d.get(attribute).eq(1));
            q
        };
        let config = CompilerConfig::default();
        assert_eq!(plan_key(&build("id"), &config), plan_key(&build("id"), &config));
        assert_ne!(plan_key(&build("id"), &config), plan_key(&build("name"), &config));
        assert_ne!(
            plan_key(&build("id"), &config),
            plan_key(&build("id"), &config.clone().strict_schema(true))
        );
    }
}

//! The session decorator.

use std::sync::Arc;

use omkit_collection::{LoadEventPolicy, LoadPhase, MaList, MaMap, MaSet};
use omkit_core::{Result, Value};
use omkit_query::{CompiledQuery, Compiler, CriteriaQuery, QueryPlanCache, plan_key};

use crate::config::SessionConfig;

// ============================================================================
// SessionApi
// ============================================================================

/// The persistence runtime a [`SessionWrapper`] decorates.
///
/// Rows are whatever the runtime materializes; the wrapper never looks
/// inside them.
pub trait SessionApi {
    type Row;

    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<Self::Row>>;

    fn persist(&mut self, row: Self::Row) -> Result<()>;

    /// Returns whether a row was removed.
    fn remove(&mut self, entity: &str, id: &Value) -> Result<bool>;

    /// Run query text with named parameters bound.
    fn execute_jpql(&mut self, jpql: &str, parameters: &[(String, Value)]) -> Result<Vec<Self::Row>>;

    fn flush(&mut self) -> Result<()>;
}

// ============================================================================
// Load targets
// ============================================================================

/// A managed collection the runtime can populate in bulk.
pub trait LoadTarget {
    type Item;

    fn load(&self, items: Vec<Self::Item>) -> Result<()>;
}

impl<E: Clone + 'static> LoadTarget for MaSet<E> {
    type Item = E;

    fn load(&self, items: Vec<E>) -> Result<()> {
        self.add_all(items).map(|_| ())
    }
}

impl<E: Clone + 'static> LoadTarget for MaList<E> {
    type Item = E;

    fn load(&self, items: Vec<E>) -> Result<()> {
        self.add_all(items).map(|_| ())
    }
}

// ============================================================================
// SessionWrapper
// ============================================================================

/// Decorates a [`SessionApi`].
///
/// Every runtime operation is delegated unchanged. Query creation goes
/// through the criteria compiler and a per-session plan cache, and bulk
/// population runs inside a [`LoadPhase`].
pub struct SessionWrapper<S> {
    inner: S,
    compiler: Arc<Compiler>,
    plans: QueryPlanCache,
    load_events: LoadEventPolicy,
}

impl<S: SessionApi> SessionWrapper<S> {
    pub fn new(inner: S, compiler: Arc<Compiler>, config: &SessionConfig) -> Self {
        Self {
            inner,
            compiler,
            plans: QueryPlanCache::new(config.plan_cache_capacity),
            load_events: config.load_events,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    pub fn plan_cache(&self) -> &QueryPlanCache {
        &self.plans
    }

    /// Compile `query`, reusing the cached plan of a structurally equal one.
    pub fn create_query(&mut self, query: &CriteriaQuery) -> Result<Arc<CompiledQuery>> {
        let key = plan_key(query, self.compiler.config());
        let compiler = &self.compiler;
        self.plans.get_or_try_insert(key, || compiler.compile(query))
    }

    /// Compile and run `query`. Caller parameters are bound after the
    /// compiled literals.
    pub fn execute(
        &mut self,
        query: &CriteriaQuery,
        parameters: &[(String, Value)],
    ) -> Result<Vec<S::Row>> {
        let plan = self.create_query(query)?;
        let mut bound = plan.literals.clone();
        bound.extend_from_slice(parameters);
        tracing::debug!(jpql = %plan.jpql, parameters = bound.len(), "Executing criteria query");
        self.inner.execute_jpql(&plan.jpql, &bound)
    }

    /// Populate a set or list as the runtime does when loading an
    /// association. Listener delivery follows the configured load policy;
    /// association propagation runs either way.
    pub fn load_collection<C: LoadTarget>(
        &self,
        target: &C,
        items: impl IntoIterator<Item = C::Item>,
    ) -> Result<()> {
        let _phase = LoadPhase::enter(self.load_events);
        target.load(items.into_iter().collect())
    }

    /// Populate a map under the configured load policy.
    pub fn load_map<K: Clone + 'static, V: Clone + 'static>(
        &self,
        target: &MaMap<K, V>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()> {
        let _phase = LoadPhase::enter(self.load_events);
        target.put_all(entries)
    }
}

impl<S: SessionApi> SessionApi for SessionWrapper<S> {
    type Row = S::Row;

    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<S::Row>> {
        self.inner.find(entity, id)
    }

    fn persist(&mut self, row: S::Row) -> Result<()> {
        self.inner.persist(row)
    }

    fn remove(&mut self, entity: &str, id: &Value) -> Result<bool> {
        self.inner.remove(entity, id)
    }

    fn execute_jpql(&mut self, jpql: &str, parameters: &[(String, Value)]) -> Result<Vec<S::Row>> {
        self.inner.execute_jpql(jpql, parameters)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

impl<S> std::fmt::Debug for SessionWrapper<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWrapper")
            .field("plans", &self.plans.len())
            .field("load_events", &self.load_events)
            .finish_non_exhaustive()
    }
}

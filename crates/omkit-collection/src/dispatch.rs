//! Deferred, ordered event delivery.
//!
//! Every mutating collection operation opens a [`Batch`]. Operations that
//! run while another batch is open (association propagation, evictions
//! triggered from hooks) join it instead of starting their own. Events are
//! queued while the structural work runs and delivered only when the
//! outermost batch finishes, so listeners always observe a settled graph.
//!
//! Delivery order is fixed: events of the collection the caller touched
//! first, then events of every other collection. Those are ordered by the
//! declaration rank their association end opened the batch with, and by the
//! order they joined the batch when no rank was given. Within one
//! collection, events keep their queueing order.
//!
//! The outermost batch of a caller operation is *explicit*; halves produced
//! by nested batches, and by frozen-context resumes, are implicit.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use omkit_core::Result;
use serde::{Deserialize, Serialize};

use crate::listener::Listeners;

type Delivery = Box<dyn FnOnce() -> Result<()>>;

struct Pending {
    rank: usize,
    deliver: Delivery,
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    /// Joined origins with their declaration rank, in join order.
    origins: Vec<(u64, Option<usize>)>,
    pending: Vec<Pending>,
    load: Vec<LoadEventPolicy>,
}

impl BatchState {
    fn rank_of(&mut self, origin: u64) -> usize {
        match self.origins.iter().position(|&(o, _)| o == origin) {
            Some(rank) => rank,
            None => {
                self.origins.push((origin, None));
                self.origins.len() - 1
            }
        }
    }

    fn declare(&mut self, origin: u64, declared: usize) {
        let rank = self.rank_of(origin);
        let slot = &mut self.origins[rank].1;
        if slot.is_none() {
            *slot = Some(declared);
        }
    }

    /// Sort key of a join rank: the caller's collection, then declared
    /// ranks, then undeclared origins in join order.
    fn delivery_key(&self, rank: usize) -> (usize, usize, usize) {
        if rank == 0 {
            return (0, 0, 0);
        }
        let declared = self.origins.get(rank).and_then(|&(_, d)| d);
        (1, declared.unwrap_or(usize::MAX), rank)
    }

    fn suppressed(&self) -> bool {
        self.load.last() == Some(&LoadEventPolicy::Suppress)
    }
}

/// Origin of [`Batch::scope`]. Collection ids start at 1.
const SCOPE_ORIGIN: u64 = 0;

thread_local! {
    static STATE: RefCell<BatchState> = RefCell::new(BatchState::default());
    static NEXT_COLLECTION_ID: Cell<u64> = const { Cell::new(1) };
}

/// A fresh identity for a collection (or association end) on this thread.
pub fn next_collection_id() -> u64 {
    NEXT_COLLECTION_ID.with(|id| {
        let next = id.get();
        id.set(next + 1);
        next
    })
}

/// One collection's participation in the current delivery batch.
pub struct Batch {
    origin: u64,
    explicit: bool,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl Batch {
    /// Open a batch on behalf of a caller operation on `origin`.
    pub fn begin(origin: u64) -> Self {
        Self::open(origin, false)
    }

    /// Open a batch whose halves are all implicit, whatever the nesting.
    pub fn begin_implicit(origin: u64) -> Self {
        Self::open(origin, true)
    }

    /// Record the declaration rank of `origin` in the open batch, which
    /// orders its delivery among the mirrored collections. The first rank
    /// recorded for an origin sticks. Ignored when no batch is open.
    pub fn declare(origin: u64, declared: usize) {
        STATE.with_borrow_mut(|state| {
            if state.depth > 0 {
                state.declare(origin, declared);
            }
        });
    }

    /// Open an implicit batch that only groups nested batches and never
    /// queues events of its own. Every collection joining it is ranked by
    /// its own join order; none of them counts as the caller's collection.
    pub fn scope() -> Self {
        Self::open(SCOPE_ORIGIN, true)
    }

    fn open(origin: u64, implicit: bool) -> Self {
        STATE.with_borrow_mut(|state| {
            let explicit = state.depth == 0 && !implicit;
            state.depth += 1;
            state.rank_of(origin);
            Self {
                origin,
                explicit,
                finished: false,
                _not_send: PhantomData,
            }
        })
    }

    /// Whether halves the caller asked for count as explicit.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether any batch is open on this thread.
    pub fn is_nested() -> bool {
        STATE.with_borrow(|state| state.depth > 0)
    }

    /// Queue a delivery. Dropped without running while a suppressing
    /// [`LoadPhase`] is active.
    pub fn enqueue(&self, deliver: impl FnOnce() -> Result<()> + 'static) {
        STATE.with_borrow_mut(|state| {
            if state.suppressed() {
                return;
            }
            let rank = state.rank_of(self.origin);
            state.pending.push(Pending {
                rank,
                deliver: Box::new(deliver),
            });
        });
    }

    /// Queue `event` for every listener registered when delivery starts.
    pub(crate) fn notify<L, Ev>(
        &self,
        listeners: &Listeners<L>,
        event: Ev,
        call: impl Fn(&L, &Ev) -> Result<()> + 'static,
    ) where
        L: ?Sized + 'static,
        Ev: 'static,
    {
        let listeners = listeners.clone();
        self.enqueue(move || {
            for listener in listeners.snapshot() {
                call(&*listener, &event)?;
            }
            Ok(())
        });
    }

    /// Close the batch. The outermost batch delivers everything queued and
    /// stops at the first listener failure.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        let pending = STATE.with_borrow_mut(|state| {
            state.depth -= 1;
            if state.depth > 0 {
                return None;
            }
            let keys: Vec<_> = (0..state.origins.len())
                .map(|rank| state.delivery_key(rank))
                .collect();
            state.origins.clear();
            Some((std::mem::take(&mut state.pending), keys))
        });
        let Some((mut pending, keys)) = pending else {
            return Ok(());
        };
        if pending.is_empty() {
            return Ok(());
        }
        pending.sort_by_key(|p| keys[p.rank]);
        tracing::debug!(events = pending.len(), "Delivering event batch");
        for p in pending {
            (p.deliver)()?;
        }
        Ok(())
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Abandoned by an error: the outermost batch discards the queue.
        let discarded = STATE.with_borrow_mut(|state| {
            state.depth -= 1;
            if state.depth == 0 {
                state.origins.clear();
                std::mem::take(&mut state.pending)
            } else {
                Vec::new()
            }
        });
        if !discarded.is_empty() {
            tracing::debug!(events = discarded.len(), "Discarding event batch");
        }
    }
}

// ============================================================================
// Load phase
// ============================================================================

/// Whether listeners hear about changes made while the runtime populates
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadEventPolicy {
    #[default]
    Suppress,
    Allow,
}

/// Thread-scoped guard marking a population pass.
///
/// Hooks and association propagation still run; only listener delivery is
/// affected.
///
/// ```
/// use omkit_collection::{LoadEventPolicy, LoadPhase};
///
/// {
///     let _load = LoadPhase::enter(LoadEventPolicy::Suppress);
///     assert_eq!(LoadPhase::current(), Some(LoadEventPolicy::Suppress));
/// }
/// assert_eq!(LoadPhase::current(), None);
/// ```
#[derive(Debug)]
pub struct LoadPhase {
    _not_send: PhantomData<*const ()>,
}

impl LoadPhase {
    pub fn enter(policy: LoadEventPolicy) -> Self {
        STATE.with_borrow_mut(|state| state.load.push(policy));
        tracing::trace!(?policy, "Entering load phase");
        Self {
            _not_send: PhantomData,
        }
    }

    /// The innermost active policy.
    pub fn current() -> Option<LoadEventPolicy> {
        STATE.with_borrow(|state| state.load.last().copied())
    }
}

impl Drop for LoadPhase {
    fn drop(&mut self) {
        STATE.with_borrow_mut(|state| state.load.pop());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn log_into(log: &Rc<RefCell<Vec<String>>>, text: &str) -> impl FnOnce() -> Result<()> + 'static {
        let log = Rc::clone(log);
        let text = text.to_string();
        move || {
            log.borrow_mut().push(text);
            Ok(())
        }
    }

    #[test]
    fn test_outer_batch_is_explicit_inner_is_not() {
        let outer = Batch::begin(1);
        assert!(outer.is_explicit());
        assert!(Batch::is_nested());
        let inner = Batch::begin(2);
        assert!(!inner.is_explicit());
        inner.finish().unwrap();
        outer.finish().unwrap();
        assert!(!Batch::is_nested());

        let resume = Batch::begin_implicit(3);
        assert!(!resume.is_explicit());
        resume.finish().unwrap();
    }

    #[test]
    fn test_delivery_waits_for_outermost_and_ranks_origin_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Batch::begin(10);
        let inner = Batch::begin(20);
        inner.enqueue(log_into(&log, "mirror"));
        inner.finish().unwrap();
        assert!(log.borrow().is_empty());
        outer.enqueue(log_into(&log, "origin"));
        outer.finish().unwrap();
        assert_eq!(*log.borrow(), vec!["origin", "mirror"]);
    }

    #[test]
    fn test_first_failure_stops_delivery() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let batch = Batch::begin(1);
        batch.enqueue(|| Err(omkit_core::Error::Custom("boom".into())));
        batch.enqueue(log_into(&log, "never"));
        assert!(batch.finish().is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_dropped_batch_discards_queue() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let batch = Batch::begin(1);
            batch.enqueue(log_into(&log, "lost"));
        }
        let next = Batch::begin(1);
        next.finish().unwrap();
        assert!(log.borrow().is_empty());
        assert!(!Batch::is_nested());
    }

    #[test]
    fn test_load_phase_suppresses_and_nests() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let _outer = LoadPhase::enter(LoadEventPolicy::Suppress);
            let batch = Batch::begin(1);
            batch.enqueue(log_into(&log, "suppressed"));
            {
                let _inner = LoadPhase::enter(LoadEventPolicy::Allow);
                batch.enqueue(log_into(&log, "allowed"));
            }
            batch.finish().unwrap();
        }
        assert_eq!(*log.borrow(), vec!["allowed"]);
        assert_eq!(LoadPhase::current(), None);
    }

    #[test]
    fn test_declared_ranks_order_mirrors() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Batch::begin(10);
        for (origin, text, declared) in [(20, "late", Some(1)), (30, "undeclared", None), (40, "early", Some(0))] {
            let inner = Batch::begin(origin);
            if let Some(declared) = declared {
                Batch::declare(origin, declared);
            }
            inner.enqueue(log_into(&log, text));
            inner.finish().unwrap();
        }
        outer.enqueue(log_into(&log, "origin"));
        outer.finish().unwrap();
        assert_eq!(*log.borrow(), vec!["origin", "early", "late", "undeclared"]);
    }

    #[test]
    fn test_declare_outside_batch_is_ignored() {
        Batch::declare(7, 0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Batch::begin(1);
        let inner = Batch::begin(7);
        inner.enqueue(log_into(&log, "mirror"));
        inner.finish().unwrap();
        outer.enqueue(log_into(&log, "origin"));
        outer.finish().unwrap();
        assert_eq!(*log.borrow(), vec!["origin", "mirror"]);
    }

    #[test]
    fn test_scope_holds_delivery_until_finished() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = Batch::scope();
        assert!(!scope.is_explicit());
        for (origin, text) in [(5, "first"), (6, "second")] {
            let batch = Batch::begin(origin);
            assert!(!batch.is_explicit());
            batch.enqueue(log_into(&log, text));
            batch.finish().unwrap();
        }
        assert!(log.borrow().is_empty());
        scope.finish().unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert!(!Batch::is_nested());
    }
}

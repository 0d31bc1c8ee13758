//! omkit - self-maintaining object graphs.
//!
//! omkit keeps in-memory object graphs consistent while application code
//! mutates them:
//!
//! - Managed sets, lists and maps that report every change as an event and
//!   rebucket elements whose hash-relevant state changes
//! - Association ends that mirror each other, so setting an employee's
//!   department also moves the employee between department collections
//! - A criteria query builder that compiles to JPQL with shared aliases,
//!   literal parameters and join elimination
//! - A session decorator that plugs all of the above into an external
//!   persistence runtime
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use omkit::prelude::*;
//!
//! let set: MaSet<String> = MaSet::new();
//! let recorder = EventRecorder::new();
//! set.add_element_listener(Rc::new(recorder.clone()) as Rc<dyn ElementListener<String>>);
//!
//! set.add("a".to_string()).unwrap();
//! set.remove(&"missing".to_string()).unwrap();
//! assert_eq!(recorder.take(), "attached(element=a)");
//! ```

pub use omkit_core::{
    ArgumentError, ConfigError, Error, ListenerError, ModificationType, PropertyVersion,
    QueryError, QueryErrorKind, Result, StateError, StateErrorKind, Value,
};

pub use omkit_collection::{
    Batch, BidiType, CollectionOptions, DefaultComparator, ElementEvent, ElementListener,
    EqualityComparator, EventRecorder, Freezable, FrozenCell, FrozenContext,
    FrozenEqualityComparator, FrozenOrderComparator, IdentityComparator, KeyComparator, KeyOrder,
    ListCursor, ListElementEvent, ListElementListener, LoadEventPolicy, LoadPhase, MaList, MaMap,
    MaSet, MapCursor, MapElementEvent, MapElementListener, MembershipHook, NaturalOrder,
    NullableComparator, OrderComparator, SetCursor,
};

pub use omkit_model::{
    ActiveRegistry, AssociatedList, AssociatedReference, AssociatedSet, AssociationEnd,
    AssociationInfo, AssociationKind, AssociationRegistry, DuplicatePolicy, Entity,
    EntityComparator, Mirror, ReferenceEvent, ReferenceListener,
};

pub use omkit_query::{
    BinaryOp, Clause, CompiledQuery, Compiler, CompilerConfig, CriteriaQuery, EntityType, Expr,
    JoinType, Metamodel, NodeId, Order, OrderDirection, PathId, QueryPath, QueryPlanCache,
    UnaryOp, plan_key,
};

pub use omkit_session::{
    CompilerCache, FactoryMetadataCache, LoadTarget, SessionApi, SessionConfig, SessionFactory,
    SessionWrapper, WeakFlagCache,
};

/// Prelude module for convenient imports.
///
/// ```
/// use omkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Collections
        BidiType,
        CollectionOptions,
        // Queries
        CompilerConfig,
        CriteriaQuery,
        // Associations
        AssociatedList,
        AssociatedReference,
        AssociatedSet,
        AssociationEnd,
        AssociationInfo,
        AssociationKind,
        ElementListener,
        Entity,
        // Core
        Error,
        EventRecorder,
        Expr,
        Freezable,
        FrozenCell,
        FrozenEqualityComparator,
        JoinType,
        ListElementListener,
        MaList,
        MaMap,
        MaSet,
        MapElementListener,
        Result,
        // Session
        SessionApi,
        SessionConfig,
        SessionFactory,
        Value,
    };
}

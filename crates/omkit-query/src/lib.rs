//! Criteria queries for omkit.
//!
//! `omkit-query` is the **query layer**. It builds typed criteria trees
//! over a [`Metamodel`] and compiles them to JPQL text.
//!
//! # Role In The Architecture
//!
//! - **Metamodel**: [`EntityType`]s name their id, basic attributes and
//!   associations. Joins and paths are validated against it.
//! - **Criteria**: [`CriteriaQuery`] owns its roots and joins; expressions
//!   refer to them through [`NodeId`] handles.
//! - **Compilation**: [`Compiler`] assigns shared aliases, lifts literals
//!   into named parameters, tracks every path occurrence ([`PathId`]) and
//!   removes joins the query does not need.
//! - **Caching**: [`QueryPlanCache`] keeps compiled plans under a
//!   structural key ([`plan_key`]).
//!
//! ```
//! use std::sync::Arc;
//! use omkit_query::{Compiler, CompilerConfig, CriteriaQuery, EntityType, JoinType, Metamodel};
//!
//! let metamodel = Metamodel::new()
//!     .entity(EntityType::new("Department", "id").basic("name"))
//!     .and_then(|m| {
//!         m.entity(
//!             EntityType::new("Employee", "id")
//!                 .basic("name")
//!                 .reference("department", "Department", false),
//!         )
//!     })
//!     .unwrap();
//!
//! let mut q = CriteriaQuery::new();
//! let employee = q.from("Employee");
//! let department = q.join(employee, "department", JoinType::Left);
//! q.select(employee).filter(department.get("id").le(100_i64));
//!
//! let compiled = Compiler::new(Arc::new(metamodel), CompilerConfig::default())
//!     .compile(&q)
//!     .unwrap();
//! assert_eq!(
//!     compiled.jpql,
//!     "select a0 from Employee a0 where a0.department.id <= :literal_0"
//! );
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod criteria;
pub mod expr;
pub mod metamodel;
pub mod path;
pub mod path_id;

pub use cache::{QueryPlanCache, plan_key};
pub use compiler::{CompiledQuery, Compiler};
pub use config::CompilerConfig;
pub use criteria::{CriteriaQuery, FromNode, JoinType, NodeId};
pub use expr::{BinaryOp, Expr, Order, OrderDirection, UnaryOp};
pub use metamodel::{Attribute, AttributeKind, EntityType, Metamodel, is_identifier};
pub use path::{FetchNode, FetchTree, QueryPath};
pub use path_id::{Clause, PathId};

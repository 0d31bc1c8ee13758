//! Core types shared by the omkit crates.
//!
//! `omkit-core` is the **foundation layer**. It provides:
//!
//! - `Error` / `Result` with the recoverable error taxonomy
//! - `Value` for literals bound into compiled queries
//! - `ModificationType` / `PropertyVersion` describing the halves of a change
//!
//! Collections, associations, the query compiler and the session layer all
//! build on these definitions.

pub mod error;
pub mod modification;
pub mod value;

pub use error::{
    ArgumentError, ConfigError, Error, ListenerError, QueryError, QueryErrorKind, Result,
    StateError, StateErrorKind,
};
pub use modification::{ModificationType, PropertyVersion};
pub use value::Value;

//! Error types for omkit operations.
//!
//! Recoverable conditions are values of [`Error`]. Broken internal invariants
//! (resuming a frozen context that was never suspended, a rehash that collides
//! with two occupants, corrupted slot bookkeeping) are panics instead.

use std::fmt;

/// The primary error type for all omkit operations.
#[derive(Debug)]
pub enum Error {
    /// An argument was rejected before any state changed.
    InvalidArgument(ArgumentError),
    /// Positional access outside `0..size` (or `0..=size` for insertion).
    IndexOutOfBounds { index: usize, size: usize },
    /// The operation is not valid in the current state of the receiver.
    IllegalState(StateError),
    /// A listener or association hook failed during dispatch.
    Listener(ListenerError),
    /// Criteria compilation errors
    Query(QueryError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ArgumentError {
    /// Name of the offending argument ("element", "key", "value", ...).
    pub argument: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// The collection was structurally modified behind a cursor.
    ConcurrentModification,
    /// `remove()` called on a cursor without a preceding `next()`.
    NoCurrentElement,
    /// The owning object of an association end is gone.
    DetachedOwner,
}

#[derive(Debug)]
pub struct ListenerError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// A path segment or entity name is not a valid identifier.
    InvalidPath,
    /// An expression refers to a node that is not part of the query.
    UnknownNode,
    /// The query selects nothing.
    EmptySelection,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`].
    pub fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument(ArgumentError {
            argument,
            message: message.into(),
        })
    }

    /// Shorthand for an [`Error::IllegalState`].
    pub fn illegal_state(kind: StateErrorKind, message: impl Into<String>) -> Self {
        Error::IllegalState(StateError {
            kind,
            message: message.into(),
        })
    }

    /// Wrap an arbitrary fault raised inside a listener.
    pub fn listener<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Listener(ListenerError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }

    /// Shorthand for an [`Error::Query`].
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            message: message.into(),
        })
    }

    /// Whether the receiver was left untouched by the failed call.
    ///
    /// Listener faults are reported after the structural change already
    /// happened, so they are the only kind that leaves state modified.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Error::Listener(_))
    }

    /// Check if this is an argument rejection.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Check if this is a cursor invalidated by another modification.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(
            self,
            Error::IllegalState(StateError {
                kind: StateErrorKind::ConcurrentModification,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(e) => {
                write!(f, "Invalid argument '{}': {}", e.argument, e.message)
            }
            Error::IndexOutOfBounds { index, size } => {
                write!(f, "Index {} out of bounds for size {}", index, size)
            }
            Error::IllegalState(e) => write!(f, "Illegal state: {}", e.message),
            Error::Listener(e) => write!(f, "Listener error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Listener(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.argument, self.message)
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ArgumentError> for Error {
    fn from(err: ArgumentError) -> Self {
        Error::InvalidArgument(err)
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::IllegalState(err)
    }
}

impl From<ListenerError> for Error {
    fn from(err: ListenerError) -> Self {
        Error::Listener(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for omkit operations.
pub type Result<T> = std::result::Result<T, Error>;

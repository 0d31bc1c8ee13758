//! Compiler configuration.

use omkit_core::Result;
use serde::{Deserialize, Serialize};

/// Options controlling JPQL generation.
///
/// ```
/// use omkit_query::CompilerConfig;
///
/// let config = CompilerConfig::from_json(r#"{ "strict_schema": true }"#).unwrap();
/// assert!(config.strict_schema);
/// assert_eq!(config.alias_prefix, "a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// The database guarantees that non-null references have non-null
    /// foreign keys, so inner joins over them can be dropped.
    pub strict_schema: bool,

    /// Prefix of shared aliases (`a0`, `a1`, ...).
    pub alias_prefix: String,

    /// Prefix of literal parameter names (`:literal_0`, ...).
    pub literal_prefix: String,

    /// Rewrite or drop joins that the query does not need.
    pub optimize_joins: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strict_schema: false,
            alias_prefix: "a".to_string(),
            literal_prefix: "literal_".to_string(),
            optimize_joins: true,
        }
    }
}

impl CompilerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn strict_schema(mut self, value: bool) -> Self {
        self.strict_schema = value;
        self
    }

    #[must_use]
    pub fn optimize_joins(mut self, value: bool) -> Self {
        self.optimize_joins = value;
        self
    }

    #[must_use]
    pub fn alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn literal_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.literal_prefix = prefix.into();
        self
    }
}

//! Session configuration.

use omkit_collection::LoadEventPolicy;
use omkit_core::{ConfigError, Error, Result};
use omkit_query::CompilerConfig;
use serde::{Deserialize, Serialize};

/// Options shared by every session a factory opens.
///
/// ```
/// use omkit_collection::LoadEventPolicy;
/// use omkit_session::SessionConfig;
///
/// let config = SessionConfig::from_json(
///     r#"{ "load_events": "allow", "compiler": { "strict_schema": true } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.load_events, LoadEventPolicy::Allow);
/// assert!(config.compiler.strict_schema);
/// assert_eq!(config.plan_cache_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether listeners fire while collections are loaded.
    pub load_events: LoadEventPolicy,

    /// Compiled plans kept per session.
    pub plan_cache_capacity: usize,

    pub compiler: CompilerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load_events: LoadEventPolicy::Suppress,
            plan_cache_capacity: 256,
            compiler: CompilerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.plan_cache_capacity == 0 {
            return Err(Error::Config(ConfigError {
                message: "plan_cache_capacity must be at least 1".to_string(),
                source: None,
            }));
        }
        if self.compiler.alias_prefix.is_empty() || self.compiler.literal_prefix.is_empty() {
            return Err(Error::Config(ConfigError {
                message: "alias and literal prefixes must not be empty".to_string(),
                source: None,
            }));
        }
        Ok(())
    }

    #[must_use]
    pub fn load_events(mut self, policy: LoadEventPolicy) -> Self {
        self.load_events = policy;
        self
    }

    #[must_use]
    pub fn plan_cache_capacity(mut self, capacity: usize) -> Self {
        self.plan_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }
}

//! Session factories.

use std::sync::Arc;

use omkit_core::Result;
use omkit_query::{Compiler, Metamodel};

use crate::config::SessionConfig;
use crate::metadata::{FactoryMetadataCache, WeakFlagCache};
use crate::wrapper::{SessionApi, SessionWrapper};

/// Compilers shared by every factory with the same name.
pub type CompilerCache = FactoryMetadataCache<String, Arc<Compiler>>;

/// Opens decorated sessions over one metamodel.
///
/// Derived metadata lives in caches the factory is given, not in globals:
/// the compiler is built once per factory name, and a metamodel is checked
/// once per instance.
#[derive(Debug)]
pub struct SessionFactory {
    name: String,
    metamodel: Arc<Metamodel>,
    config: SessionConfig,
    compilers: Arc<CompilerCache>,
    validated: Arc<WeakFlagCache<Metamodel>>,
}

impl SessionFactory {
    pub fn new(name: impl Into<String>, metamodel: Arc<Metamodel>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            metamodel,
            config,
            compilers: Arc::new(CompilerCache::new()),
            validated: Arc::new(WeakFlagCache::new()),
        })
    }

    /// Share a compiler cache with other factories.
    #[must_use]
    pub fn with_compiler_cache(mut self, cache: Arc<CompilerCache>) -> Self {
        self.compilers = cache;
        self
    }

    /// Share a metamodel validation memo with other factories.
    #[must_use]
    pub fn with_validation_cache(mut self, cache: Arc<WeakFlagCache<Metamodel>>) -> Self {
        self.validated = cache;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn metamodel(&self) -> &Arc<Metamodel> {
        &self.metamodel
    }

    /// The factory's compiler. Fails if the metamodel has dangling
    /// association targets.
    pub fn compiler(&self) -> Result<Arc<Compiler>> {
        if !self
            .validated
            .get_or_compute(&self.metamodel, |m| m.validate().is_ok())
        {
            self.metamodel.validate()?;
        }
        Ok(self.compilers.get_or_compute(self.name.as_str(), |name| {
            tracing::debug!(factory = %name, entities = self.metamodel.len(), "Building criteria compiler");
            Arc::new(Compiler::new(
                Arc::clone(&self.metamodel),
                self.config.compiler.clone(),
            ))
        }))
    }

    pub fn open<S: SessionApi>(&self, session: S) -> Result<SessionWrapper<S>> {
        Ok(SessionWrapper::new(session, self.compiler()?, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSession, metamodel};
    use omkit_query::EntityType;

    #[test]
    fn test_compiler_built_once_per_name() {
        let shared = Arc::new(CompilerCache::new());
        let a = SessionFactory::new("orders", metamodel(), SessionConfig::default())
            .unwrap()
            .with_compiler_cache(Arc::clone(&shared));
        let b = SessionFactory::new("orders", metamodel(), SessionConfig::default())
            .unwrap()
            .with_compiler_cache(Arc::clone(&shared));
        assert!(Arc::ptr_eq(&a.compiler().unwrap(), &b.compiler().unwrap()));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_dangling_metamodel_rejected() {
        let broken = Arc::new(
            Metamodel::new()
                .entity(EntityType::new("Employee", "id").reference("department", "Department", true))
                .unwrap(),
        );
        let validated = Arc::new(WeakFlagCache::new());
        let factory = SessionFactory::new("broken", broken, SessionConfig::default())
            .unwrap()
            .with_validation_cache(Arc::clone(&validated));
        assert!(factory.open(RecordingSession::default()).is_err());
        assert!(factory.compiler().is_err());
        assert_eq!(validated.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig::default().plan_cache_capacity(0);
        assert!(SessionFactory::new("x", metamodel(), config).is_err());
    }

    #[test]
    fn test_open_wraps_session() {
        let factory = SessionFactory::new("hr", metamodel(), SessionConfig::default()).unwrap();
        let session = factory.open(RecordingSession::default()).unwrap();
        assert!(Arc::ptr_eq(session.compiler(), &factory.compiler().unwrap()));
    }
}

//! # Target Registry
//!
//! The default [`TargetSelector`]: a concurrent map of service names to either
//! a shared instance or a factory that builds a target per call.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::context::CallContext;
use crate::error::Error;
use crate::error::Result;
use crate::target::Target;
use crate::target::TargetSelector;

type Factory = Arc<dyn Fn(&CallContext) -> Arc<dyn Target> + Send + Sync>;

#[derive(Default)]
pub struct DefaultTargetSelector {
    instances: DashMap<String, Arc<dyn Target>>,
    factories: DashMap<String, Factory>,
}

impl DefaultTargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared instance under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, target: Arc<dyn Target>) -> &Self {
        let name = name.into();
        debug!(service = %name, "registering target instance");
        self.factories.remove(&name);
        self.instances.insert(name, target);
        self
    }

    /// Registers a shared instance under its own service name.
    pub fn register_service(&self, target: Arc<dyn Target>) -> &Self {
        let name = target.service_name();
        self.register(name, target)
    }

    /// Registers a factory that builds a fresh target for every call.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F) -> &Self
    where
        F: Fn(&CallContext) -> Arc<dyn Target> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(service = %name, "registering target factory");
        self.instances.remove(&name);
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn unregister(&self, name: &str) -> bool {
        let instance = self.instances.remove(name).is_some();
        let factory = self.factories.remove(name).is_some();
        instance || factory
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name) || self.factories.contains_key(name)
    }
}

impl TargetSelector for DefaultTargetSelector {
    fn resolve(&self, name: &str, context: &CallContext) -> Result<Arc<dyn Target>> {
        if let Some(target) = self.instances.get(name) {
            return Ok(Arc::clone(target.value()));
        }

        // clone out of the map so the factory never runs under a shard lock
        let factory = self.factories.get(name).map(|f| Arc::clone(f.value()));
        match factory {
            Some(factory) => Ok(factory(context)),
            None => Err(Error::TargetNotFound(name.to_string())),
        }
    }
}

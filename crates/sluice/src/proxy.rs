//! # Service Proxies
//!
//! A proxy is a generated struct implementing a service trait by forwarding
//! every method to an [`Invoker`]. `#[sluice::service]` emits the struct and
//! its [`ServiceProxy`] impl; this module owns the invoker seam and the
//! process-wide schema registry.
//!
//! ## Invariants
//!
//! - The schema for a proxy type is built at most once per registry, even
//!   under concurrent first use. Other callers for the same type wait on the
//!   build; callers for other types are never blocked by it.
//! - A proxy whose service has synchronous methods can only be created over an
//!   invoker that supports blocking calls.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::OnceLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tracing::debug;

use crate::Value;
use crate::descriptor::MethodDescriptor;
use crate::error::Error;
use crate::error::Result;

/// The callback every generated proxy method forwards to.
#[async_trait::async_trait]
pub trait Invoker: Send + Sync + 'static {
    async fn invoke(&self, method: &'static MethodDescriptor, args: Vec<Value>) -> Result<Value>;

    /// Synchronous path for plain `fn` service methods.
    fn invoke_blocking(&self, method: &'static MethodDescriptor, _args: Vec<Value>) -> Result<Value> {
        Err(Error::UnsupportedSignature {
            service: method.service,
            method: method.name,
        })
    }

    fn supports_blocking(&self) -> bool {
        false
    }
}

/// Implemented by generated `<Trait>Proxy` structs.
pub trait ServiceProxy: Send + Sync + Sized + 'static {
    /// The service name, used as the default target name.
    const NAME: &'static str;

    fn methods() -> &'static [MethodDescriptor];

    fn from_invoker(invoker: Arc<dyn Invoker>) -> Self;
}

/// What the registry learned about a proxy type when it was first used.
#[derive(Debug)]
pub struct ProxySchema {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
    blocking: Vec<&'static str>,
}

impl ProxySchema {
    fn build<P: ServiceProxy>() -> Self {
        let methods = P::methods();
        let blocking = methods.iter().filter(|m| m.blocking).map(|m| m.name).collect();
        Self { name: P::NAME, methods, blocking }
    }

    pub fn requires_blocking(&self) -> bool {
        !self.blocking.is_empty()
    }

    pub fn blocking_methods(&self) -> &[&'static str] {
        &self.blocking
    }
}

#[derive(Default)]
pub struct ProxyRegistry {
    schemas: DashMap<TypeId, Arc<OnceLock<Arc<ProxySchema>>>>,
    builds: AtomicUsize,
}

static GLOBAL: LazyLock<ProxyRegistry> = LazyLock::new(ProxyRegistry::new);

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process. It is never torn down.
    pub fn global() -> &'static ProxyRegistry {
        &GLOBAL
    }

    pub fn schema<P: ServiceProxy>(&self) -> Arc<ProxySchema> {
        let cell = Arc::clone(&self.schemas.entry(TypeId::of::<P>()).or_default());
        let schema = cell.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            debug!(service = P::NAME, "building proxy schema");
            Arc::new(ProxySchema::build::<P>())
        });
        Arc::clone(schema)
    }

    pub fn create<P: ServiceProxy>(&self, invoker: Arc<dyn Invoker>) -> Result<P> {
        let schema = self.schema::<P>();
        if let Some(&method) = schema.blocking.first() {
            if !invoker.supports_blocking() {
                return Err(Error::UnsupportedSignature { service: schema.name, method });
            }
        }
        Ok(P::from_invoker(invoker))
    }

    /// How many schemas this registry has built.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

/// Creates a proxy through the process-wide registry.
pub fn create<P: ServiceProxy>(invoker: Arc<dyn Invoker>) -> Result<P> {
    ProxyRegistry::global().create(invoker)
}

//! # Engine
//!
//! Composition root: one serializer and one binder, shared by every request
//! handler and proxy the engine creates.

use std::sync::Arc;

use crate::binder::DefaultBinder;
use crate::binder::MethodBinder;
use crate::client::CallProxy;
use crate::error::Result;
use crate::handler::ErrorHandler;
use crate::handler::Interceptor;
use crate::handler::RequestHandler;
use crate::proxy::ProxyRegistry;
use crate::proxy::ServiceProxy;
use crate::serializer::JsonSerializer;
use crate::serializer::Serializer;
use crate::target::TargetSelector;
use crate::transport::ClientTransport;

#[derive(Clone)]
pub struct Engine {
    serializer: Arc<dyn Serializer>,
    binder: Arc<dyn MethodBinder>,
}

impl Engine {
    /// JSON encoding with the default binder.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    pub fn binder(&self) -> &Arc<dyn MethodBinder> {
        &self.binder
    }

    /// Starts a request handler with interceptors and an error handler.
    pub fn handler(&self, selector: Arc<dyn TargetSelector>) -> RequestHandlerBuilder {
        RequestHandlerBuilder {
            engine: self.clone(),
            selector,
            interceptors: Vec::new(),
            errors: None,
        }
    }

    /// A request handler with no interceptors and no error handler.
    pub fn create_request_handler(&self, selector: Arc<dyn TargetSelector>) -> Arc<RequestHandler> {
        self.handler(selector).build()
    }

    /// Creates a proxy addressing the service's own name.
    pub fn create_proxy<P: ServiceProxy>(&self, transport: Arc<dyn ClientTransport>) -> Result<P> {
        self.create_proxy_named(transport, P::NAME)
    }

    /// Creates a proxy addressing `target` instead of the service name.
    pub fn create_proxy_named<P: ServiceProxy>(
        &self,
        transport: Arc<dyn ClientTransport>,
        target: impl Into<String>,
    ) -> Result<P> {
        let invoker = CallProxy::new(target, transport, Arc::clone(&self.serializer), Arc::clone(&self.binder));
        ProxyRegistry::global().create(Arc::new(invoker))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    serializer: Option<Arc<dyn Serializer>>,
    binder: Option<Arc<dyn MethodBinder>>,
}

impl EngineBuilder {
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn MethodBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            serializer: self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer)),
            binder: self.binder.unwrap_or_else(|| Arc::new(DefaultBinder::new())),
        }
    }
}

/// Fluent builder for [`RequestHandler`].
pub struct RequestHandlerBuilder {
    engine: Engine,
    selector: Arc<dyn TargetSelector>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    errors: Option<Arc<dyn ErrorHandler>>,
}

impl RequestHandlerBuilder {
    /// Appends an interceptor. The first one added runs outermost.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn error_handler(mut self, errors: impl ErrorHandler) -> Self {
        self.errors = Some(Arc::new(errors));
        self
    }

    pub fn build(self) -> Arc<RequestHandler> {
        Arc::new(RequestHandler::new(
            self.selector,
            self.engine.binder,
            self.engine.serializer,
            self.interceptors,
            self.errors,
        ))
    }
}

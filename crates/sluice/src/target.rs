//! # Targets
//!
//! A [`Target`] is the server-side object behind a service name. Generated
//! `<Trait>Target` adapters implement it by matching on the method index and
//! decoding positional arguments; hand-written targets are just as valid.

use std::any::TypeId;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::Value;
use crate::context::CallContext;
use crate::descriptor::MethodDescriptor;
use crate::error::Result;

#[async_trait::async_trait]
pub trait Target: Send + Sync + 'static {
    /// The service name this target answers to by default.
    fn service_name(&self) -> &'static str;

    /// The descriptor table the binder resolves signatures against.
    fn methods(&self) -> &'static [MethodDescriptor];

    /// Runs `method` with already decoded positional arguments.
    ///
    /// Unit-returning methods resolve to [`Value::Null`].
    async fn invoke(&self, method: &'static MethodDescriptor, args: Vec<Value>) -> anyhow::Result<Value>;

    /// Lets the target gate or wrap its own execution.
    fn context_hook(&self) -> Option<&dyn ContextAware> {
        None
    }

    /// Key for per-type caches. Dispatches to the concrete type behind a `dyn Target`.
    fn runtime_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// A target that wants to see every call before it runs, e.g. to authorize it.
#[async_trait::async_trait]
pub trait ContextAware: Send + Sync {
    /// `next` runs the actual method. Not awaiting it skips the call.
    async fn on_execute_call(
        &self,
        context: &CallContext,
        method: &'static MethodDescriptor,
        next: BoxFuture<'static, anyhow::Result<Value>>,
    ) -> anyhow::Result<Value>;
}

/// Resolves a service name to the target that should serve it.
pub trait TargetSelector: Send + Sync + 'static {
    /// Fails with [`crate::Error::TargetNotFound`] for unknown names.
    fn resolve(&self, name: &str, context: &CallContext) -> Result<Arc<dyn Target>>;
}

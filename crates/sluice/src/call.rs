//! Call and result containers passed between the serializer, the client proxy
//! and the request handler.

use std::fmt;
use std::sync::Arc;

use crate::Value;
use crate::descriptor::MethodDescriptor;
use crate::target::Target;

/// A call on its way out: borrowed, never stored.
#[derive(Debug, Clone, Copy)]
pub struct OutboundCall<'a> {
    pub target: &'a str,
    pub method: &'static MethodDescriptor,
    pub args: &'a [Value],
}

/// A decoded inbound call, owned by the request handler for one request.
pub struct MethodCall {
    pub target_name: String,
    pub target: Arc<dyn Target>,
    pub method: &'static MethodDescriptor,
    pub args: Vec<Value>,
    resources: CallResources,
}

impl MethodCall {
    pub fn new(
        target_name: impl Into<String>,
        target: Arc<dyn Target>,
        method: &'static MethodDescriptor,
        args: Vec<Value>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            target,
            method,
            args,
            resources: CallResources::default(),
        }
    }

    /// Pooled resources tied to this call, e.g. a decode arena.
    pub fn resources_mut(&mut self) -> &mut CallResources {
        &mut self.resources
    }

    /// Releases pooled resources. Later calls are no-ops.
    pub fn release(&mut self) {
        self.resources.release();
    }
}

impl fmt::Debug for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCall")
            .field("target_name", &self.target_name)
            .field("method", &self.method.name)
            .field("args", &self.args)
            .finish()
    }
}

/// Release hooks that run exactly once: on [`CallResources::release`] or on drop,
/// whichever comes first.
#[derive(Default)]
pub struct CallResources {
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

impl CallResources {
    pub fn on_release(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn release(&mut self) {
        for hook in self.hooks.drain(..) {
            hook();
        }
    }

    pub fn is_released(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Drop for CallResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// A decoded response. Both fields empty means a successful unit or null result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCallResult {
    pub result: Option<Value>,
    pub exception: Option<String>,
}

impl MethodCallResult {
    pub fn value(result: Option<Value>) -> Self {
        Self { result, exception: None }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self { result: None, exception: Some(message.into()) }
    }
}

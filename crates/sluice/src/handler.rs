//! # Request Handler
//!
//! Server-side dispatch: bytes in, bytes out, no fault escapes.
//!
//! Each request runs through a fixed sequence:
//!
//! 1. decode the call and resolve its target,
//! 2. run the interceptor chain, ending in the target's own context hook (if
//!    any) and then the method itself,
//! 3. release the call's pooled resources,
//! 4. encode the value, or pass the fault to the [`ErrorHandler`] and encode
//!    the message it chose,
//! 5. hand the payload to the transport's responder.
//!
//! ## Invariants
//!
//! - Every request gets exactly one response payload, including when the
//!   target, an interceptor or the error handler panics.
//! - A failed response delivery is reported to the error handler and dropped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::Value;
use crate::binder::MethodBinder;
use crate::call::MethodCall;
use crate::context::CallContext;
use crate::serializer::Serializer;
use crate::target::TargetSelector;
use crate::transport;
use crate::transport::Handler;
use crate::transport::Request;

/// Middleware around method invocation.
///
/// An interceptor may inspect or rewrite `call.args`, short-circuit by
/// returning without calling `next`, or transform the result.
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, call: &mut MethodCall, context: &CallContext, next: Next<'_>) -> anyhow::Result<Value>;
}

/// The rest of the interceptor chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>]) -> Self {
        Self { chain }
    }

    pub fn run<'c>(self, call: &'c mut MethodCall, context: &'c CallContext) -> BoxFuture<'c, anyhow::Result<Value>>
    where
        'a: 'c,
    {
        match self.chain.split_first() {
            Some((head, rest)) => head.intercept(call, context, Next { chain: rest }),
            None => Box::pin(invoke_target(call, context)),
        }
    }
}

/// Innermost stage: the target's context hook, then the method.
async fn invoke_target(call: &mut MethodCall, context: &CallContext) -> anyhow::Result<Value> {
    let target = Arc::clone(&call.target);
    let method = call.method;
    let args = std::mem::take(&mut call.args);

    let invocation: BoxFuture<'static, anyhow::Result<Value>> = {
        let target = Arc::clone(&target);
        Box::pin(async move { target.invoke(method, args).await })
    };

    match target.context_hook() {
        Some(hook) => hook.on_execute_call(context, method, invocation).await,
        None => invocation.await,
    }
}

/// Turns a fault into the message sent back to the caller.
pub trait ErrorHandler: Send + Sync + 'static {
    /// `Ok(None)` sends a generic message. `Err` falls back to the raw fault.
    fn handle(&self, fault: &anyhow::Error) -> anyhow::Result<Option<String>>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&anyhow::Error) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
{
    fn handle(&self, fault: &anyhow::Error) -> anyhow::Result<Option<String>> {
        self(fault)
    }
}

const GENERIC_MESSAGE: &str = "Internal Server Error";

pub struct RequestHandler {
    selector: Arc<dyn TargetSelector>,
    binder: Arc<dyn MethodBinder>,
    serializer: Arc<dyn Serializer>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    errors: Option<Arc<dyn ErrorHandler>>,
}

impl RequestHandler {
    pub fn new(
        selector: Arc<dyn TargetSelector>,
        binder: Arc<dyn MethodBinder>,
        serializer: Arc<dyn Serializer>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        errors: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        Self {
            selector,
            binder,
            serializer,
            interceptors,
            errors,
        }
    }

    /// Runs one request to a response payload.
    pub async fn process(&self, payload: &[u8], context: &CallContext) -> Vec<u8> {
        let outcome = AssertUnwindSafe(self.dispatch(payload, context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("target panicked: {}", panic_message(&*panic))));

        let fault = match outcome {
            Ok(value) => match self.serializer.serialize_result(&value) {
                Ok(bytes) => return bytes,
                Err(e) => anyhow::Error::new(e),
            },
            Err(fault) => fault,
        };

        let message = self.public_message(&fault);
        match self.serializer.serialize_exception(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "could not encode an exception response");
                Vec::new()
            }
        }
    }

    async fn dispatch(&self, payload: &[u8], context: &CallContext) -> anyhow::Result<Value> {
        let mut call = self
            .serializer
            .deserialize_call(payload, &*self.binder, &*self.selector, context)?;
        debug!(target = %call.target_name, method = call.method.name, "dispatching call");

        let result = Next::new(&self.interceptors).run(&mut call, context).await;
        call.release();
        result
    }

    fn public_message(&self, fault: &anyhow::Error) -> String {
        let Some(errors) = &self.errors else {
            return format!("{:#}", fault);
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| errors.handle(fault))) {
            Ok(Ok(Some(message))) => message,
            Ok(Ok(None)) => GENERIC_MESSAGE.to_string(),
            Ok(Err(e)) => {
                warn!(error = %e, "error handler failed");
                format!("{:#}", fault)
            }
            Err(_) => {
                warn!("error handler panicked");
                format!("{:#}", fault)
            }
        }
    }

    fn delivery_failed(&self, e: transport::Error) {
        warn!(error = %e, "response delivery failed");
        if let Some(errors) = &self.errors {
            let fault = anyhow::Error::new(e);
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| errors.handle(&fault)));
        }
    }
}

#[async_trait::async_trait]
impl Handler for RequestHandler {
    async fn handle(&self, request: Request) {
        let (payload, context, responder) = request.into_parts();
        let response = self.process(&payload, &context).await;
        if let Err(e) = responder.respond(response).await {
            self.delivery_failed(e);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

//! # Client Call Proxy
//!
//! The [`Invoker`] behind every remote proxy: encode the call, push it through
//! a transport, decode the answer.
//!
//! The call proxy is stateless beyond its bindings; pooling, correlation and
//! connection state belong to the transport.

use std::sync::Arc;

use crate::Value;
use crate::binder::MethodBinder;
use crate::call::OutboundCall;
use crate::descriptor::MethodDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::proxy::Invoker;
use crate::serializer::Serializer;
use crate::transport::ClientTransport;

pub struct CallProxy {
    target: String,
    transport: Arc<dyn ClientTransport>,
    serializer: Arc<dyn Serializer>,
    binder: Arc<dyn MethodBinder>,
}

impl CallProxy {
    pub fn new(
        target: impl Into<String>,
        transport: Arc<dyn ClientTransport>,
        serializer: Arc<dyn Serializer>,
        binder: Arc<dyn MethodBinder>,
    ) -> Self {
        Self {
            target: target.into(),
            transport,
            serializer,
            binder,
        }
    }

    /// The service name every call is addressed to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait::async_trait]
impl Invoker for CallProxy {
    async fn invoke(&self, method: &'static MethodDescriptor, args: Vec<Value>) -> Result<Value> {
        let call = OutboundCall {
            target: &self.target,
            method,
            args: &args,
        };
        let request = self.serializer.serialize_call(&*self.binder, &call)?;

        // correlation and retries are the transport's business
        let response = self.transport.send(&request).await?;

        let result = self.serializer.deserialize_result(&response, &method.returns)?;
        if let Some(message) = result.exception {
            return Err(Error::Remote(message));
        }
        Ok(result.result.unwrap_or(Value::Null))
    }
}

//! # Sluice
//!
//! A transport-agnostic RPC runtime. A trait annotated with [`service`] becomes
//! a client proxy on one side and a dispatchable [`Target`] on the other; bytes
//! move between them over any [`transport::ClientTransport`].
//!
//! ## Philosophy
//!
//! - **Encoding is pluggable**: the [`Serializer`] decides what a call looks
//!   like on the wire. The runtime only sees opaque payloads.
//! - **Transports move bytes**: "send bytes, await bytes" is the whole client
//!   contract. Pooling and multiplexing live inside the TCP transport.
//! - **Faults stay local**: a failing request produces an error response, never
//!   a dead host.

extern crate self as sluice;

pub mod binder;
pub mod call;
pub mod client;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod registry;
pub mod serializer;
pub mod target;
pub mod transport;

pub use anyhow;
pub use async_trait::async_trait;
pub use serde_json::Value;
pub use sluice_derive::service;

pub use crate::binder::DefaultBinder;
pub use crate::binder::MethodBinder;
pub use crate::binder::MethodTable;
pub use crate::call::MethodCall;
pub use crate::call::MethodCallResult;
pub use crate::client::CallProxy;
pub use crate::context::CallContext;
pub use crate::context::Peer;
pub use crate::descriptor::MethodDescriptor;
pub use crate::descriptor::MethodSignature;
pub use crate::descriptor::ReturnShape;
pub use crate::engine::Engine;
pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::handler::ErrorHandler;
pub use crate::handler::Interceptor;
pub use crate::handler::Next;
pub use crate::handler::RequestHandler;
pub use crate::proxy::Invoker;
pub use crate::proxy::ServiceProxy;
pub use crate::registry::DefaultTargetSelector;
pub use crate::serializer::JsonSerializer;
pub use crate::serializer::Serializer;
pub use crate::target::ContextAware;
pub use crate::target::Target;
pub use crate::target::TargetSelector;

/// Converts an argument or return value into the wire value model.
pub fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Converts a wire value back into a concrete type.
pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Pulls the next positional argument for `method` and decodes it.
///
/// Used by generated target adapters.
pub fn arg<T, I>(args: &mut I, method: &MethodDescriptor, position: usize) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    I: Iterator<Item = Value>,
{
    let value = args.next().ok_or_else(|| Error::ArgumentCount {
        method: method.to_string(),
        expected: method.params.len(),
        found: position,
    })?;
    from_value(value)
}

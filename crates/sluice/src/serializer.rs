//! # Serializer Boundary
//!
//! The only place a wire encoding is chosen. The runtime hands the serializer
//! calls and results; the serializer hands back opaque bytes.

use crate::Value;
use crate::binder::MethodBinder;
use crate::call::MethodCall;
use crate::call::MethodCallResult;
use crate::call::OutboundCall;
use crate::context::CallContext;
use crate::descriptor::ReturnShape;
use crate::error::Result;
use crate::target::TargetSelector;

mod json;

pub use json::JsonSerializer;

pub trait Serializer: Send + Sync + 'static {
    /// Encodes `{target, signature, arguments}` for the wire.
    fn serialize_call(&self, binder: &dyn MethodBinder, call: &OutboundCall<'_>) -> Result<Vec<u8>>;

    /// Decodes a call, resolving its target through `selector`.
    ///
    /// Unknown targets, unknown signatures, wrong argument counts and malformed
    /// payloads all fail here.
    fn deserialize_call(
        &self,
        payload: &[u8],
        binder: &dyn MethodBinder,
        selector: &dyn TargetSelector,
        context: &CallContext,
    ) -> Result<MethodCall>;

    fn serialize_result(&self, value: &Value) -> Result<Vec<u8>>;

    fn serialize_exception(&self, message: &str) -> Result<Vec<u8>>;

    fn deserialize_result(&self, payload: &[u8], returns: &ReturnShape) -> Result<MethodCallResult>;
}

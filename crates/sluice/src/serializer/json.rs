//! JSON wire encoding.
//!
//! Calls: `{"Target": "Calc", "MethodSignature": [3, 97, ...], "Arguments": [2, 3]}`.
//! Results: `{"Result": 5}` or `{"Exception": "boom"}`.

use serde::Deserialize;
use serde::Serialize;

use crate::Value;
use crate::binder::MethodBinder;
use crate::call::MethodCall;
use crate::call::MethodCallResult;
use crate::call::OutboundCall;
use crate::context::CallContext;
use crate::descriptor::ReturnShape;
use crate::error::Error;
use crate::error::Result;
use crate::serializer::Serializer;
use crate::target::TargetSelector;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CallEnvelopeRef<'a> {
    target: &'a str,
    method_signature: &'a [u8],
    arguments: &'a [Value],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallEnvelope {
    target: String,
    method_signature: Vec<u8>,
    #[serde(default)]
    arguments: Vec<Value>,
}

#[derive(Serialize)]
enum ResultEnvelopeRef<'a> {
    Result(&'a Value),
    Exception(&'a str),
}

#[derive(Deserialize)]
enum ResultEnvelope {
    Result(Value),
    Exception(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

impl Serializer for JsonSerializer {
    fn serialize_call(&self, binder: &dyn MethodBinder, call: &OutboundCall<'_>) -> Result<Vec<u8>> {
        let signature = binder.method_signature(call.method);
        encode(&CallEnvelopeRef {
            target: call.target,
            method_signature: signature.as_bytes(),
            arguments: call.args,
        })
    }

    fn deserialize_call(
        &self,
        payload: &[u8],
        binder: &dyn MethodBinder,
        selector: &dyn TargetSelector,
        context: &CallContext,
    ) -> Result<MethodCall> {
        let envelope: CallEnvelope = serde_json::from_slice(payload)
            .map_err(|e| Error::Serialization(format!("malformed call: {}", e)))?;

        let target = selector.resolve(&envelope.target, context)?;
        let method = binder.info_provider_for(&*target).method(&envelope.method_signature)?;

        if envelope.arguments.len() != method.params.len() {
            return Err(Error::ArgumentCount {
                method: method.to_string(),
                expected: method.params.len(),
                found: envelope.arguments.len(),
            });
        }

        Ok(MethodCall::new(envelope.target, target, method, envelope.arguments))
    }

    fn serialize_result(&self, value: &Value) -> Result<Vec<u8>> {
        encode(&ResultEnvelopeRef::Result(value))
    }

    fn serialize_exception(&self, message: &str) -> Result<Vec<u8>> {
        encode(&ResultEnvelopeRef::Exception(message))
    }

    fn deserialize_result(&self, payload: &[u8], returns: &ReturnShape) -> Result<MethodCallResult> {
        let envelope: ResultEnvelope = serde_json::from_slice(payload)
            .map_err(|e| Error::Serialization(format!("malformed result: {}", e)))?;

        Ok(match (envelope, returns) {
            (ResultEnvelope::Exception(message), _) => MethodCallResult::exception(message),
            (ResultEnvelope::Result(_), ReturnShape::Unit) => MethodCallResult::value(None),
            (ResultEnvelope::Result(Value::Null), _) => MethodCallResult::value(None),
            (ResultEnvelope::Result(value), ReturnShape::Value(_)) => MethodCallResult::value(Some(value)),
        })
    }
}

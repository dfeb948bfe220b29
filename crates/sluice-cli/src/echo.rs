//! The demo service served and called by the binary.

use std::time::Instant;

use sluice::CallContext;
use sluice::Interceptor;
use sluice::MethodCall;
use sluice::Next;
use sluice::Value;
use tracing::info;

#[sluice::service]
pub trait Echo {
    async fn echo(&self, message: String) -> anyhow::Result<String>;
    async fn shout(&self, message: String) -> anyhow::Result<String>;
    async fn fail(&self, message: String) -> anyhow::Result<String>;
}

pub struct EchoService;

#[sluice::async_trait]
impl Echo for EchoService {
    async fn echo(&self, message: String) -> anyhow::Result<String> {
        Ok(message)
    }

    async fn shout(&self, message: String) -> anyhow::Result<String> {
        Ok(message.to_uppercase())
    }

    async fn fail(&self, message: String) -> anyhow::Result<String> {
        anyhow::bail!(message)
    }
}

/// Logs every served call with its peer and duration.
pub struct AccessLog;

#[sluice::async_trait]
impl Interceptor for AccessLog {
    async fn intercept(&self, call: &mut MethodCall, context: &CallContext, next: Next<'_>) -> anyhow::Result<Value> {
        let started = Instant::now();
        let method = call.method;
        let result = next.run(call, context).await;
        let peer = context.peer().map(|p| p.to_string()).unwrap_or_default();
        info!(%peer, %method, ok = result.is_ok(), elapsed = ?started.elapsed(), "served call");
        result
    }
}

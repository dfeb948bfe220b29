//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use sluice::DefaultTargetSelector;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber once per test binary. `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

#[sluice::service]
pub trait Calc {
    async fn add(&self, a: i32, b: i32) -> anyhow::Result<i32>;
    async fn fail(&self, message: String) -> anyhow::Result<i32>;
    async fn echo(&self, bytes: Vec<u8>) -> anyhow::Result<Vec<u8>>;
    async fn touch(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct Calculator {
    pub touches: AtomicUsize,
}

#[sluice::async_trait]
impl Calc for Calculator {
    async fn add(&self, a: i32, b: i32) -> anyhow::Result<i32> {
        Ok(a + b)
    }

    async fn fail(&self, message: String) -> anyhow::Result<i32> {
        Err(io::Error::other(message).into())
    }

    async fn echo(&self, bytes: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        Ok(bytes)
    }

    async fn touch(&self) -> anyhow::Result<()> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn calc_selector(calculator: Arc<Calculator>) -> Arc<DefaultTargetSelector> {
    let selector = DefaultTargetSelector::new();
    selector.register_service(Arc::new(CalcTarget::new(calculator)));
    Arc::new(selector)
}

/// A pipe name no other test is using.
pub fn unique_pipe(prefix: &str) -> String {
    format!("{}-{:016x}", prefix, rand::random::<u64>())
}

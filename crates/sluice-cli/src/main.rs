//! `sluice`: serve or call the demo echo service over TCP, a named pipe or HTTP.

mod echo;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use sluice::DefaultTargetSelector;
use sluice::Engine;
use sluice::RequestHandler;
use sluice::transport::ClientTransport;
use sluice::transport::http::HttpClientTransport;
use sluice::transport::pipe::PipeClientTransport;
use sluice::transport::pipe::PipeHost;
use sluice::transport::tcp::TcpClientConfig;
use sluice::transport::tcp::TcpClientTransport;
use sluice::transport::tcp::TcpHost;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::echo::AccessLog;
use crate::echo::Echo;
use crate::echo::EchoProxy;
use crate::echo::EchoService;
use crate::echo::EchoTarget;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Serve or call the sluice echo service")]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the echo service over TCP
    ServeTcp {
        #[arg(long, default_value = "127.0.0.1:7100")]
        listen: String,
    },
    /// Serve the echo service over a named pipe
    ServePipe {
        #[arg(long, default_value = "sluice-echo")]
        name: String,
    },
    /// Call the echo service
    Call {
        /// TCP endpoints; the first to accept wins
        #[arg(long, conflicts_with_all = ["pipe", "http"])]
        tcp: Vec<String>,
        #[arg(long, conflicts_with = "http")]
        pipe: Option<String>,
        /// Full URL of an HTTP endpoint
        #[arg(long)]
        http: Option<String>,
        #[arg(long, value_enum, default_value_t = Method::Echo)]
        method: Method,
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        message: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Echo,
    Shout,
    Fail,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .compact()
        .init();

    let engine = Engine::new();
    match args.command {
        Command::ServeTcp { listen } => serve_tcp(&engine, &listen).await,
        Command::ServePipe { name } => serve_pipe(&engine, &name).await,
        Command::Call {
            tcp,
            pipe,
            http,
            method,
            count,
            timeout_ms,
            message,
        } => {
            let timeout = timeout_ms.map(Duration::from_millis);
            let transport = client_transport(tcp, pipe, http, timeout)?;
            call(&engine, transport, method, count, &message).await
        }
    }
}

fn handler(engine: &Engine) -> Arc<RequestHandler> {
    let selector = DefaultTargetSelector::new();
    selector.register_service(Arc::new(EchoTarget::new(Arc::new(EchoService))));
    engine.handler(Arc::new(selector)).interceptor(AccessLog).build()
}

async fn serve_tcp(engine: &Engine, listen: &str) -> Result<()> {
    let host = TcpHost::new(handler(engine));
    let addr = host.start_listening(listen).await?;
    info!(%addr, "serving echo over tcp");
    wait_for_shutdown(host.errors()).await?;
    host.stop_listening();
    Ok(())
}

async fn serve_pipe(engine: &Engine, name: &str) -> Result<()> {
    let host = PipeHost::new(handler(engine));
    host.start_listening(name).await?;
    info!(pipe = name, "serving echo over a named pipe");
    wait_for_shutdown(host.errors()).await?;
    host.stop_listening();
    Ok(())
}

/// Logs host faults until ctrl-c.
async fn wait_for_shutdown(mut errors: tokio::sync::broadcast::Receiver<sluice::transport::HostError>) -> Result<()> {
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown signal received");
                return Ok(());
            }
            event = errors.recv() => match event {
                Ok(event) => warn!(%event, "host fault"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "host faults dropped"),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tokio::signal::ctrl_c().await?;
                    return Ok(());
                }
            },
        }
    }
}

fn client_transport(
    tcp: Vec<String>,
    pipe: Option<String>,
    http: Option<String>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn ClientTransport>> {
    if let Some(name) = pipe {
        return Ok(Arc::new(PipeClientTransport::new(name)));
    }
    if let Some(url) = http {
        let transport = match timeout {
            Some(limit) => HttpClientTransport::with_timeout(url, limit)?,
            None => HttpClientTransport::new(url),
        };
        return Ok(Arc::new(transport));
    }
    if tcp.is_empty() {
        anyhow::bail!("one of --tcp, --pipe or --http is required");
    }

    let mut config = TcpClientConfig::new(tcp).with_min_pool_size(1);
    if let Some(limit) = timeout {
        config = config.with_request_timeout(limit);
    }
    Ok(Arc::new(TcpClientTransport::new(config)))
}

async fn call(
    engine: &Engine,
    transport: Arc<dyn ClientTransport>,
    method: Method,
    count: usize,
    message: &str,
) -> Result<()> {
    let echo: EchoProxy = engine.create_proxy(transport)?;
    let started = Instant::now();

    for _ in 0..count {
        let reply = match method {
            Method::Echo => echo.echo(message.to_string()).await?,
            Method::Shout => echo.shout(message.to_string()).await?,
            Method::Fail => echo.fail(message.to_string()).await?,
        };
        println!("{}", reply);
    }

    info!(count, elapsed = ?started.elapsed(), "calls complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_tcp_call() {
        let args = Args::try_parse_from([
            "sluice", "call", "--tcp", "127.0.0.1:1", "--tcp", "127.0.0.1:2", "--method", "shout", "hello",
        ])
        .unwrap();
        match args.command {
            Command::Call { tcp, method, message, count, .. } => {
                assert_eq!(tcp, vec!["127.0.0.1:1", "127.0.0.1:2"]);
                assert_eq!(method, Method::Shout);
                assert_eq!(message, "hello");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_two_transports() {
        assert!(Args::try_parse_from(["sluice", "call", "--pipe", "p", "--http", "http://x", "hi"]).is_err());
    }

    #[test]
    fn a_call_needs_some_transport() {
        assert!(client_transport(Vec::new(), None, None, None).is_err());
    }
}

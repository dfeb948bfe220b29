//! Windows named pipes.
//!
//! Each connection consumes a server instance, so the listener always keeps
//! the next one created before handing out the connected one.

use std::io;
use std::time::Duration;

use tokio::net::windows::named_pipe::ClientOptions;
use tokio::net::windows::named_pipe::NamedPipeClient;
use tokio::net::windows::named_pipe::NamedPipeServer;
use tokio::net::windows::named_pipe::ServerOptions;

pub(crate) type ServerStream = NamedPipeServer;
pub(crate) type ClientStream = NamedPipeClient;

const ERROR_PIPE_BUSY: i32 = 231;

pub(crate) fn endpoint(name: &str) -> String {
    if name.starts_with(r"\\.\pipe\") {
        name.to_string()
    } else {
        format!(r"\\.\pipe\{}", name)
    }
}

pub(crate) struct PipeListener {
    endpoint: String,
    next: NamedPipeServer,
}

impl PipeListener {
    pub(crate) fn bind(name: &str) -> io::Result<Self> {
        let endpoint = endpoint(name);
        let next = ServerOptions::new().first_pipe_instance(true).create(&endpoint)?;
        Ok(Self { endpoint, next })
    }

    pub(crate) async fn accept(&mut self) -> io::Result<ServerStream> {
        self.next.connect().await?;
        let fresh = ServerOptions::new().create(&self.endpoint)?;
        Ok(std::mem::replace(&mut self.next, fresh))
    }
}

pub(crate) async fn connect(name: &str) -> io::Result<ClientStream> {
    let endpoint = endpoint(name);
    loop {
        match ClientOptions::new().open(&endpoint) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

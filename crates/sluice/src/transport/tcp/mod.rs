//! # TCP Transport
//!
//! Pooled, optionally multiplexed request/response over TCP.
//!
//! ## Philosophy
//!
//! - **One writer per socket**: every outbound frame goes through the
//!   connection's FIFO send queue, so concurrent senders never interleave bytes.
//! - **Correlate by id**: each frame carries a per-connection request id that the
//!   host echoes back. Responses may arrive in any order.
//! - **Fail together**: an I/O fault on a connection fails every request still
//!   pending on it, and nothing else.

mod client;
mod config;
mod connection;
mod host;
mod pool;
mod send_queue;

pub use client::TcpClientTransport;
pub use config::HostConfig;
pub use config::TcpClientConfig;
pub use host::TcpHost;

#[cfg(test)]
mod tests;

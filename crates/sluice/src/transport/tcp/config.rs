use std::time::Duration;

use crate::transport::frame::DEFAULT_MAX_FRAME_LEN;

/// Settings for [`super::TcpClientTransport`].
#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    /// Candidate `host:port` endpoints. The first to accept a connection wins.
    pub remotes: Vec<String>,
    /// Below this many pooled connections, every call opens a fresh one.
    pub min_pool_size: usize,
    /// Idle connections kept once a call finishes. `None` means `min_pool_size`.
    /// Connections opened past the cap serve their call and are then closed.
    pub max_pool_size: Option<usize>,
    /// Share one connection among concurrent calls.
    pub multiplexing: bool,
    pub max_frame_len: usize,
    pub connect_timeout: Option<Duration>,
    /// Upper bound on a single call. `None` waits until the connection fails.
    pub request_timeout: Option<Duration>,
}

impl TcpClientConfig {
    pub fn new<I, S>(remotes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            remotes: remotes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_min_pool_size(mut self, size: usize) -> Self {
        self.min_pool_size = size;
        self
    }

    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Connections the pool may hold, never below `min_pool_size` or 1.
    pub fn pool_capacity(&self) -> usize {
        self.max_pool_size
            .unwrap_or(self.min_pool_size)
            .max(self.min_pool_size)
            .max(1)
    }

    pub fn with_multiplexing(mut self, enabled: bool) -> Self {
        self.multiplexing = enabled;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            remotes: Vec::new(),
            min_pool_size: 5,
            max_pool_size: None,
            multiplexing: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            connect_timeout: None,
            request_timeout: None,
        }
    }
}

/// Settings shared by the TCP and pipe hosts.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub max_frame_len: usize,
}

impl HostConfig {
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

//! HTTP client transport: every send is one `POST` of the raw payload.

use std::time::Duration;

use tracing::debug;

use crate::transport::ClientTransport;
use crate::transport::Error;
use crate::transport::Result;

pub struct HttpClientTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpClientTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Builds a client with an overall per-request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self::with_client(client, url))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn map_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else if e.is_connect() {
        Error::Connect(vec![e.to_string()])
    } else {
        Error::Io(e.to_string())
    }
}

#[async_trait::async_trait]
impl ClientTransport for HttpClientTransport {
    async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %self.url, %status, "http transport got a failure status");
            return Err(Error::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_reqwest)?;
        Ok(body.to_vec())
    }
}

//! HTTP transport abstraction.
//!
//! The client's timeout, retry and cancellation logic is written against the
//! [`Transport`] trait so it can be exercised without a network. The
//! production implementation wraps `reqwest`.

use std::time::Duration;

use crate::error::{Error, Result};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("safedrive/", env!("CARGO_PKG_VERSION"));

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl TransportResponse {
    /// Create a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Check whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A way of performing GET requests.
///
/// Implementations must be cancel-safe: dropping the returned future aborts
/// the request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Perform a GET request against the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or no response
    /// arrived. Non-2xx statuses are not errors at this level.
    async fn get(&self, url: &str) -> Result<TransportResponse>;
}

/// Transport backed by a `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built (for
    /// example when no TLS backend is available).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(url, e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(url, e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

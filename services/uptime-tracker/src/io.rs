//! Transport abstraction for the container runtime API

#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, UptimeError};

/// HTTP response from the runtime API
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the runtime API connection for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeTransport: Send + Sync {
    /// Send a GET request for `path` (e.g. `/containers/json`)
    async fn get(&self, path: &str) -> Result<HttpResponse>;
}

#[cfg(unix)]
const UNIX_SOCKET_BASE_URL: &str = "http://localhost";

/// Runtime API client over TCP or a local unix socket
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UptimeError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Talk to the runtime over a unix socket (e.g. `/var/run/docker.sock`)
    #[cfg(unix)]
    pub fn unix_socket(socket_path: &Path, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .unix_socket(socket_path)
            .timeout(timeout)
            .build()
            .map_err(|e| UptimeError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            // The host is ignored, every connection goes through the socket
            base_url: UNIX_SOCKET_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl RuntimeTransport for ReqwestTransport {
    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UptimeError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| UptimeError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

//! Default HTTP binding for the transport capability
//!
//! Standard verbs with JSON request and response bodies. A non-2xx status
//! is returned as a [`ResourceError::Status`] carrying the parsed body,
//! never an `Err` from the HTTP client layer alone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use tracing::debug;

use super::transport::{RequestOptions, ResourceError, Result, Transport};
use crate::value::Json;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: format!("statebox/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ResourceError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn send(
        &self,
        method: Method,
        locator: &str,
        body: Option<&Json>,
        options: &RequestOptions,
    ) -> Result<Json> {
        debug!(%method, locator, "issuing resource operation");

        let mut request = self
            .client
            .request(method, locator)
            .header(header::CONTENT_TYPE, "application/json");

        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResourceError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ResourceError::Transport(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            // Whatever the server sent back rides along on the error;
            // unparseable bodies degrade to null.
            let body = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
            return Err(ResourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if bytes.is_empty() {
            return Ok(Json::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ResourceError::Transport(format!("invalid JSON body: {e}")))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(HttpConfig::default()).expect("default HTTP client configuration is valid")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn read(&self, locator: &str, options: &RequestOptions) -> Result<Json> {
        self.send(Method::GET, locator, None, options).await
    }

    async fn create(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json> {
        self.send(Method::POST, locator, Some(body), options).await
    }

    async fn replace(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json> {
        self.send(Method::PUT, locator, Some(body), options).await
    }

    async fn merge(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json> {
        self.send(Method::PATCH, locator, Some(body), options).await
    }

    async fn remove(&self, locator: &str, options: &RequestOptions) -> Result<Json> {
        self.send(Method::DELETE, locator, None, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("statebox/"));
    }

    #[test]
    fn client_builds_from_config() {
        assert!(HttpTransport::new(HttpConfig::default()).is_ok());
    }

    #[test]
    fn default_transport_carries_default_config() {
        let transport = HttpTransport::default();
        assert_eq!(transport.config().connect_timeout, Duration::from_secs(10));
        assert_eq!(transport.config().request_timeout, Duration::from_secs(60));
        assert!(transport.config().user_agent.starts_with("statebox/"));
    }
}

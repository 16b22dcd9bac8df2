//! Transport capability consumed by fetched stores
//!
//! Resource operations never panic on a bad response: a non-success status
//! or a connection problem comes back as a [`ResourceError`] value, which
//! the fetched store routes to its catcher callbacks.

use async_trait::async_trait;
use thiserror::Error;

use crate::value::Json;

#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// The resource answered with a non-success status.
    #[error("resource returned status {status}")]
    Status { status: u16, body: Json },

    /// The request never produced a usable response.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ResourceError {
    /// Status code, when the resource answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ResourceError::Status { status, .. } => Some(*status),
            ResourceError::Transport(_) => None,
        }
    }

    /// Parsed response body, when one was received.
    pub fn body(&self) -> Option<&Json> {
        match self {
            ResourceError::Status { body, .. } => Some(body),
            ResourceError::Transport(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Extra per-request data handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Request options, either fixed up front or recomputed at every call
/// (e.g. an authorization header that rotates).
pub enum OptionsProvider {
    Fixed(RequestOptions),
    Lazy(Box<dyn Fn() -> RequestOptions + Send + Sync>),
}

impl Default for OptionsProvider {
    fn default() -> Self {
        OptionsProvider::Fixed(RequestOptions::default())
    }
}

impl OptionsProvider {
    pub fn lazy<F>(provider: F) -> Self
    where
        F: Fn() -> RequestOptions + Send + Sync + 'static,
    {
        OptionsProvider::Lazy(Box::new(provider))
    }

    pub fn resolve(&self) -> RequestOptions {
        match self {
            OptionsProvider::Fixed(options) => options.clone(),
            OptionsProvider::Lazy(provider) => provider(),
        }
    }
}

impl From<RequestOptions> for OptionsProvider {
    fn from(options: RequestOptions) -> Self {
        OptionsProvider::Fixed(options)
    }
}

/// Asynchronous read/write operations against a resource locator.
///
/// The default binding is [`HttpTransport`](super::http::HttpTransport);
/// tests inject fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read(&self, locator: &str, options: &RequestOptions) -> Result<Json>;

    async fn create(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json>;

    async fn replace(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json>;

    async fn merge(&self, locator: &str, body: &Json, options: &RequestOptions) -> Result<Json>;

    async fn remove(&self, locator: &str, options: &RequestOptions) -> Result<Json>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_error_exposes_code_and_body() {
        let error = ResourceError::Status {
            status: 404,
            body: json!({"detail": "missing"}),
        };
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.body(), Some(&json!({"detail": "missing"})));
    }

    #[test]
    fn transport_error_has_no_status() {
        let error = ResourceError::Transport("connection refused".into());
        assert_eq!(error.status(), None);
        assert!(error.body().is_none());
    }

    #[test]
    fn lazy_options_resolve_per_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let provider = OptionsProvider::lazy(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            RequestOptions::default().header("x-call", n.to_string())
        });

        assert_eq!(provider.resolve().headers[0].1, "0");
        assert_eq!(provider.resolve().headers[0].1, "1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

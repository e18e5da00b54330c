//! Request/response model and the async client trait.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{HttpError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Serialize `body` as JSON and set the matching content type.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| HttpError::Request(format!("JSON serialization failed: {}", e)))?;
        self.body = Some(Bytes::from(encoded));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// An HTTP response with the body fully read into memory.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Body(format!("JSON deserialization failed: {}", e)))
    }

    /// Response body as a UTF-8 string.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| HttpError::Body(format!("invalid UTF-8: {}", e)))
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retry behavior for transient transport failures.
///
/// Implementations must only retry statuses that cannot carry protocol
/// meaning for callers (429 and 5xx); 4xx responses are returned as-is so
/// that authentication-failure classification sees the raw status.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Async HTTP client abstraction.
///
/// The account core issues every provider call through this trait; swapping
/// the implementation swaps the transport without touching protocol logic.
///
/// # Example
///
/// ```ignore
/// use bridge_http::{HttpClient, HttpMethod, HttpRequest};
///
/// async fn ping(client: &dyn HttpClient) -> bridge_http::Result<u16> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://api.example.com/ping");
///     Ok(client.execute(request).await?.status)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request, returning the response regardless of status code.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport-level failures (connect,
    /// timeout, body read). Non-2xx statuses are not errors here.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

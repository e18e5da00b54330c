//! Reqwest-backed implementation of the [`HttpClient`] trait.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{HttpError, Result};
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};

/// Production HTTP client built on `reqwest`.
///
/// Provides connection pooling, rustls TLS and bounded retry with
/// exponential backoff. Only 429 and 5xx responses are retried; every 4xx
/// reaches the caller untouched so credential-failure classification works
/// on the real status.
pub struct ReqwestHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a client with the default 30 second request timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .user_agent("cloud-account/0.1.0")
            .build()
            .expect("reqwest client construction cannot fail with static config");

        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder
    }

    fn classify_send_error(e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout
        } else if e.is_connect() {
            HttpError::Connect(e.to_string())
        } else {
            HttpError::Request(e.to_string())
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn retryable(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        let mut last_error;

        loop {
            attempt += 1;
            debug!(
                attempt,
                max_attempts = self.retry.max_attempts,
                url = %request.url,
                "executing HTTP request"
            );

            match self.build_request(request.clone()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !Self::retryable(status) {
                        return Self::read_response(response).await;
                    }
                    warn!(status, attempt, "transient HTTP status, will retry");
                    last_error = HttpError::Request(format!("HTTP {} error", status));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    last_error = Self::classify_send_error(e);
                }
            }

            if attempt >= self.retry.max_attempts {
                return Err(last_error);
            }

            let delay = (self.retry.base_delay * 2u32.pow(attempt - 1)).min(self.retry.max_delay);
            sleep(delay).await;
        }
    }
}

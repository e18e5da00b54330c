//! Authenticated call engine: bearer injection, response classification,
//! bounded refresh-and-replay.

use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info, instrument};

use bridge_http::{HttpMethod, HttpRequest, HttpResponse};

use crate::credential::Credential;
use crate::error::{ApiCallError, CredentialError};

/// Default provider API host.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Status the provider uses for an expired access token.
const EXPIRED_ACCESS_TOKEN_STATUS: u16 = 401;

const FORBIDDEN: u16 = 403;

/// `reason` value in the provider's error envelope that signals
/// unauthenticated-use limits — observed when a refresh token has been
/// revoked, which is why it is folded into the revoked-token outcome.
const UNREGISTERED_LIMIT_REASON: &str = "dailyLimitExceededUnreg";

/// One provider API call, before bearer injection.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Host override; defaults to the credential's base URL.
    pub base_url: Option<String>,
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Pre-encoded query string, without the leading `?`.
    pub url_params: Option<String>,
    pub body: Option<Bytes>,
    /// Per-call transport timeout; the client's default applies when unset.
    pub timeout: Option<std::time::Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            base_url: None,
            path: path.into(),
            headers: HashMap::new(),
            url_params: None,
            body: None,
            timeout: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn url_params(mut self, params: impl Into<String>) -> Self {
        self.url_params = Some(params.into());
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// Provider error envelope, as much of it as classification needs.
#[derive(Debug, Deserialize)]
struct VendorErrorEnvelope {
    error: VendorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct VendorErrorDetail {
    #[serde(default)]
    errors: Vec<VendorErrorItem>,
}

#[derive(Debug, Deserialize)]
struct VendorErrorItem {
    reason: Option<String>,
}

/// The anonymous-limit signature: 403 with a structured error body whose
/// first item carries the unregistered-use reason.
fn is_unregistered_limit(response: &HttpResponse) -> bool {
    if response.status != FORBIDDEN {
        return false;
    }

    response
        .json::<VendorErrorEnvelope>()
        .map(|envelope| {
            envelope
                .error
                .errors
                .first()
                .and_then(|item| item.reason.as_deref())
                == Some(UNREGISTERED_LIMIT_REASON)
        })
        .unwrap_or(false)
}

impl Credential {
    fn to_http_request(
        &self,
        request: &ApiRequest,
        headers: HashMap<String, String>,
    ) -> HttpRequest {
        let base = request.base_url.as_deref().unwrap_or(&self.base_url);
        let mut url = format!("{}{}", base, request.path);
        if let Some(params) = &request.url_params {
            url.push('?');
            url.push_str(params);
        }

        let mut http_request = HttpRequest::new(request.method, url).headers(headers);
        if let Some(body) = &request.body {
            http_request = http_request.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            http_request = http_request.timeout(timeout);
        }
        http_request
    }

    /// Issue a provider call with the current access token, recovering from
    /// token expiration once.
    ///
    /// Classification, in priority order:
    ///
    /// 1. the anonymous-limit error shape is remapped to
    ///    [`ApiCallError::AccessTokenRevoked`] — same terminal category as a
    ///    real revocation, so callers handle one case instead of two;
    /// 2. a 401, when this credential has not refreshed yet, triggers a
    ///    single [`refresh`](Credential::refresh) and — on success — one
    ///    replay of the original request, whose response is returned
    ///    verbatim; a 401 on the replay is just an ordinary response, the
    ///    guard keeps a second refresh from ever happening;
    /// 3. everything else passes through unchanged, success and failure
    ///    alike.
    #[instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    pub async fn api_call(
        &mut self,
        request: ApiRequest,
    ) -> Result<HttpResponse, ApiCallError> {
        let mut headers = request.headers.clone();
        if let Some(token) = &self.access_token {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        let response = self
            .http
            .execute(self.to_http_request(&request, headers.clone()))
            .await?;

        if is_unregistered_limit(&response) {
            info!("provider reported unregistered-use limit; treating access token as revoked");
            return Err(ApiCallError::AccessTokenRevoked);
        }

        if response.status != EXPIRED_ACCESS_TOKEN_STATUS || self.already_refreshed {
            return Ok(response);
        }

        // First 401 for this credential: one refresh, one replay.
        self.already_refreshed = true;
        info!("unauthorized response, refreshing access token");

        match self.refresh().await {
            Err(CredentialError::ExpiredOrRevoked) => {
                info!("refresh token expired or revoked");
                Err(ApiCallError::AccessTokenRevoked)
            }
            Err(e) => {
                error!(error = %e, "access token refresh failed");
                Err(ApiCallError::RefreshFailed(e))
            }
            Ok(()) => {
                info!("access token refreshed, replaying original request");
                if let Some(token) = &self.access_token {
                    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
                }
                let replay = self
                    .http
                    .execute(self.to_http_request(&request, headers))
                    .await?;
                Ok(replay)
            }
        }
    }
}

//! Token endpoint protocol: authorization-code exchange and refresh.
//!
//! Both paths POST a form-urlencoded grant to the provider's token endpoint
//! and go straight to the HTTP primitive — never through the call engine, so
//! token-endpoint responses are never themselves subject to refresh/replay
//! classification.

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use bridge_http::{HttpMethod, HttpRequest, HttpResponse};

use crate::credential::Credential;
use crate::error::{CredentialError, Result};

const TOKEN_PATH: &str = "/oauth2/v4/token";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Error code the provider uses for an expired or revoked grant.
const INVALID_GRANT: &str = "invalid_grant";

/// Token endpoint success payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Token endpoint failure payload.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
}

impl Credential {
    /// Exchange the one-time authorization code for a token pair.
    ///
    /// Succeeds trivially, with no network call, when no authorization code
    /// is present — callers invoke this unconditionally and only linked
    /// accounts carry a code. On success both tokens are set on the
    /// credential and the delegate persistence step runs.
    #[instrument(skip(self))]
    pub async fn generate_tokens(&mut self) -> Result<()> {
        let Some(code) = self.authorization_code.clone() else {
            info!("no authorization code present, nothing to exchange");
            return Ok(());
        };

        let (client_id, client_secret) = self.config.require()?;

        let body = encode_form(&[
            ("code", code.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", ""),
            ("grant_type", "authorization_code"),
        ])?;

        let response = self.token_endpoint_post(body).await?;

        if !response.is_success() {
            error!(status = response.status, "authorization code exchange failed");
            return Err(CredentialError::BadStatus(response.status));
        }

        let tokens: TokenResponse = response
            .json()
            .map_err(|_| CredentialError::MalformedTokenResponse)?;

        let (Some(access_token), Some(refresh_token)) =
            (tokens.access_token, tokens.refresh_token)
        else {
            error!("token endpoint response missing access or refresh token");
            return Err(CredentialError::MalformedTokenResponse);
        };

        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
        info!("authorization code exchanged for token pair");

        self.persist()
    }

    /// Mint a new access token from the refresh token.
    ///
    /// Fails fast — no network call — when no refresh token is held. A
    /// provider `invalid_grant` answer maps to
    /// [`CredentialError::ExpiredOrRevoked`], which callers treat as "this
    /// account needs re-authentication" and never retry.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(refresh_token) = self.refresh_token.clone() else {
            warn!("refresh requested without a refresh token");
            return Err(CredentialError::NoRefreshToken);
        };

        let (client_id, client_secret) = self.config.require()?;

        let body = encode_form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])?;

        let response = self.token_endpoint_post(body).await?;

        if response.status == 400 {
            if let Ok(failure) = response.json::<TokenErrorResponse>() {
                if failure.error.as_deref() == Some(INVALID_GRANT) {
                    error!("token endpoint reported invalid_grant");
                    return Err(CredentialError::ExpiredOrRevoked);
                }
            }
        }

        if !response.is_success() {
            error!(status = response.status, "token refresh failed");
            return Err(CredentialError::BadStatus(response.status));
        }

        let tokens: TokenResponse = response
            .json()
            .map_err(|_| CredentialError::MalformedTokenResponse)?;

        let Some(access_token) = tokens.access_token else {
            error!("token endpoint response missing access token");
            return Err(CredentialError::MalformedTokenResponse);
        };

        self.access_token = Some(access_token);
        debug!("access token refreshed");

        self.persist()
    }

    async fn token_endpoint_post(&self, body: String) -> Result<HttpResponse> {
        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}{}", self.base_url, TOKEN_PATH),
        )
        .header("Content-Type", FORM_CONTENT_TYPE)
        .body(Bytes::from(body));

        Ok(self.http.execute(request).await?)
    }

    /// Delegate persistence step shared by both minting paths.
    ///
    /// No delegate (or one the host already dropped) is a warning, not an
    /// error; a delegate that reports a failed save is an error.
    pub(crate) fn persist(&self) -> Result<()> {
        let Some(delegate) = self.delegate.as_ref().and_then(std::sync::Weak::upgrade) else {
            warn!("no credential delegate configured; tokens were not persisted");
            return Ok(());
        };

        if delegate.save(self) {
            Ok(())
        } else {
            Err(CredentialError::PersistFailed)
        }
    }
}

fn encode_form(fields: &[(&str, &str)]) -> Result<String> {
    serde_urlencoded::to_string(fields).map_err(|e| CredentialError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::delegate::CredentialDelegate;
    use async_trait::async_trait;
    use bridge_http::HttpClient;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_http::Result<HttpResponse>;
        }
    }

    struct RecordingDelegate {
        saves: AtomicUsize,
        succeed: bool,
    }

    impl RecordingDelegate {
        fn new(succeed: bool) -> Self {
            Self {
                saves: AtomicUsize::new(0),
                succeed,
            }
        }

        fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    impl CredentialDelegate for RecordingDelegate {
        fn save(&self, _credential: &Credential) -> bool {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn configured_credential(http: MockHttp) -> Credential {
        Credential::new(AccountConfig::new("client-id", "client-secret"), Arc::new(http))
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_makes_no_network_call() {
        let mut http = MockHttp::new();
        http.expect_execute().times(0);

        let mut credential = configured_credential(http);
        let result = credential.refresh().await;

        assert!(matches!(result, Err(CredentialError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn refresh_without_client_config_makes_no_network_call() {
        let mut http = MockHttp::new();
        http.expect_execute().times(0);

        let mut credential = Credential::new(AccountConfig::default(), Arc::new(http));
        credential.set_refresh_token("r1");

        let result = credential.refresh().await;
        assert!(matches!(result, Err(CredentialError::MissingClientConfig)));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant_and_updates_access_token() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .withf(|request| {
                let body = request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).to_string())
                    .unwrap_or_default();
                request.url.ends_with("/oauth2/v4/token")
                    && request.headers.get("Content-Type")
                        == Some(&FORM_CONTENT_TYPE.to_string())
                    && body.contains("grant_type=refresh_token")
                    && body.contains("refresh_token=r1")
                    && body.contains("client_id=client-id")
            })
            .returning(|_| Ok(response(200, r#"{"access_token":"fresh"}"#)));

        let mut credential = configured_credential(http);
        credential.set_refresh_token("r1");
        credential.set_access_token("stale");

        credential.refresh().await.unwrap();
        assert_eq!(credential.access_token(), Some("fresh"));
        // Refresh never replaces the stored refresh token.
        assert_eq!(credential.refresh_token(), Some("r1"));
    }

    #[tokio::test]
    async fn refresh_invalid_grant_reports_expired_or_revoked() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_grant"}"#)));

        let mut credential = configured_credential(http);
        credential.set_refresh_token("revoked");

        let result = credential.refresh().await;
        assert!(matches!(result, Err(CredentialError::ExpiredOrRevoked)));
        assert!(credential.access_token().is_none());
    }

    #[tokio::test]
    async fn refresh_other_bad_request_is_a_bad_status() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_client"}"#)));

        let mut credential = configured_credential(http);
        credential.set_refresh_token("r1");

        let result = credential.refresh().await;
        assert!(matches!(result, Err(CredentialError::BadStatus(400))));
    }

    #[tokio::test]
    async fn refresh_server_error_carries_status() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(503, "")));

        let mut credential = configured_credential(http);
        credential.set_refresh_token("r1");

        let result = credential.refresh().await;
        assert!(matches!(result, Err(CredentialError::BadStatus(503))));
    }

    #[tokio::test]
    async fn refresh_success_without_token_is_malformed() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"token_type":"Bearer"}"#)));

        let mut credential = configured_credential(http);
        credential.set_refresh_token("r1");

        let result = credential.refresh().await;
        assert!(matches!(
            result,
            Err(CredentialError::MalformedTokenResponse)
        ));
    }

    #[tokio::test]
    async fn refresh_persists_through_delegate() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"fresh"}"#)));

        let delegate = Arc::new(RecordingDelegate::new(true));
        let dyn_delegate: Arc<dyn CredentialDelegate> = delegate.clone();

        let mut credential =
            configured_credential(http).with_delegate(Arc::downgrade(&dyn_delegate));
        credential.set_refresh_token("r1");

        credential.refresh().await.unwrap();
        assert_eq!(delegate.save_count(), 1);
    }

    #[tokio::test]
    async fn refresh_reports_delegate_save_failure() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"fresh"}"#)));

        let delegate = Arc::new(RecordingDelegate::new(false));
        let dyn_delegate: Arc<dyn CredentialDelegate> = delegate.clone();

        let mut credential =
            configured_credential(http).with_delegate(Arc::downgrade(&dyn_delegate));
        credential.set_refresh_token("r1");

        let result = credential.refresh().await;
        assert!(matches!(result, Err(CredentialError::PersistFailed)));
        // The token itself was still refreshed in memory.
        assert_eq!(credential.access_token(), Some("fresh"));
    }

    #[tokio::test]
    async fn refresh_with_dropped_delegate_still_succeeds() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"fresh"}"#)));

        let weak = {
            let delegate: Arc<dyn CredentialDelegate> =
                Arc::new(RecordingDelegate::new(true));
            Arc::downgrade(&delegate)
        };

        let mut credential = configured_credential(http).with_delegate(weak);
        credential.set_refresh_token("r1");

        credential.refresh().await.unwrap();
        assert_eq!(credential.access_token(), Some("fresh"));
    }

    #[tokio::test]
    async fn generate_tokens_without_code_makes_no_network_call() {
        let mut http = MockHttp::new();
        http.expect_execute().times(0);

        let mut credential = configured_credential(http);
        credential.generate_tokens().await.unwrap();
        assert!(credential.access_token().is_none());
    }

    #[tokio::test]
    async fn generate_tokens_without_client_config_fails_fast() {
        let mut http = MockHttp::new();
        http.expect_execute().times(0);

        let mut credential = Credential::new(AccountConfig::default(), Arc::new(http));
        credential.set_authorization_code("one-time");

        let result = credential.generate_tokens().await;
        assert!(matches!(result, Err(CredentialError::MissingClientConfig)));
    }

    #[tokio::test]
    async fn generate_tokens_exchanges_code_for_token_pair() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .withf(|request| {
                let body = request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).to_string())
                    .unwrap_or_default();
                body.contains("grant_type=authorization_code")
                    && body.contains("code=one-time")
                    && body.contains("redirect_uri=")
            })
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"a1","refresh_token":"r1"}"#,
                ))
            });

        let delegate = Arc::new(RecordingDelegate::new(true));
        let dyn_delegate: Arc<dyn CredentialDelegate> = delegate.clone();

        let mut credential =
            configured_credential(http).with_delegate(Arc::downgrade(&dyn_delegate));
        credential.set_authorization_code("one-time");

        credential.generate_tokens().await.unwrap();
        assert_eq!(credential.access_token(), Some("a1"));
        assert_eq!(credential.refresh_token(), Some("r1"));
        assert_eq!(delegate.save_count(), 1);
    }

    #[tokio::test]
    async fn generate_tokens_requires_both_tokens_in_response() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"a1"}"#)));

        let mut credential = configured_credential(http);
        credential.set_authorization_code("one-time");

        let result = credential.generate_tokens().await;
        assert!(matches!(
            result,
            Err(CredentialError::MalformedTokenResponse)
        ));
    }

    #[tokio::test]
    async fn generate_tokens_bad_status_is_reported() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(403, "")));

        let mut credential = configured_credential(http);
        credential.set_authorization_code("one-time");

        let result = credential.generate_tokens().await;
        assert!(matches!(result, Err(CredentialError::BadStatus(403))));
    }
}

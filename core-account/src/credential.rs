//! Credential state: token values, stored encoding, reconciliation.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use bridge_http::HttpClient;

use crate::config::AccountConfig;
use crate::delegate::CredentialDelegate;
use crate::engine::DEFAULT_BASE_URL;
use crate::error::{CredentialError, Result};

/// Wire property key carrying the client-supplied access token.
pub const ACCESS_TOKEN_PROPERTY: &str = "x-account-access-token";

/// Wire property key carrying the one-time authorization code.
pub const AUTHORIZATION_CODE_PROPERTY: &str = "x-account-authorization-code";

// Stored-form keys, fixed by what existing databases contain.
const STORED_ACCESS_TOKEN_KEY: &str = "accessToken";
const STORED_REFRESH_TOKEN_KEY: &str = "refreshToken";
const STORED_AUTHORIZATION_CODE_KEY: &str = "authorizationCode";

/// Server-side credential for one provider account.
///
/// An instance is scoped to a single logical operation (one endpoint
/// invocation and the provider calls it makes). The `already_refreshed`
/// one-shot guard relies on that scoping: it is never reset, so a credential
/// attempts at most one access-token refresh in its lifetime.
pub struct Credential {
    pub(crate) access_token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) authorization_code: Option<String>,
    pub(crate) already_refreshed: bool,
    pub(crate) config: AccountConfig,
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) delegate: Option<Weak<dyn CredentialDelegate>>,
    pub(crate) base_url: String,
}

#[derive(Deserialize)]
struct StoredCredential {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "authorizationCode")]
    authorization_code: Option<String>,
}

/// Filter a header map down to the account properties this credential
/// understands. Unknown headers are dropped; both known keys are optional.
pub fn properties_from_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    for key in [AUTHORIZATION_CODE_PROPERTY, ACCESS_TOKEN_PROPERTY] {
        if let Some(value) = headers.get(key) {
            properties.insert(key.to_string(), value.clone());
        }
    }
    properties
}

impl Credential {
    /// An empty credential: no tokens, no delegate, guard unset.
    pub fn new(config: AccountConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            authorization_code: None,
            already_refreshed: false,
            config,
            http,
            delegate: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Attach the persistence delegate. The reference is non-owning; a
    /// delegate dropped by the host is treated the same as none at all.
    pub fn with_delegate(mut self, delegate: Weak<dyn CredentialDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn set_delegate(&mut self, delegate: Weak<dyn CredentialDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Point token-endpoint and provider calls at a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build a credential from client-supplied wire properties.
    ///
    /// Both the access token and the authorization code are optional here;
    /// nothing is validated — token validity is only discovered by use.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        config: AccountConfig,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let mut credential = Self::new(config, http);
        credential.access_token = properties.get(ACCESS_TOKEN_PROPERTY).cloned();
        credential.authorization_code = properties.get(AUTHORIZATION_CODE_PROPERTY).cloned();
        credential
    }

    /// Decode a credential from its stored form.
    ///
    /// The access token is required — owning accounts always persist one.
    /// The refresh token and authorization code are optional: clients do not
    /// always send them, and bootstrap environments may omit them.
    pub fn from_stored(
        stored: &str,
        config: AccountConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let parsed: StoredCredential =
            serde_json::from_str(stored).map_err(|e| CredentialError::Decode(e.to_string()))?;

        let access_token = parsed.access_token.ok_or_else(|| {
            CredentialError::Decode(format!("missing required key {}", STORED_ACCESS_TOKEN_KEY))
        })?;

        let mut credential = Self::new(config, http);
        credential.access_token = Some(access_token);
        credential.refresh_token = parsed.refresh_token;
        credential.authorization_code = parsed.authorization_code;
        Ok(credential)
    }

    /// Encode the credential for storage, omitting absent fields.
    pub fn to_stored(&self) -> String {
        let mut map = serde_json::Map::new();
        if let Some(token) = &self.access_token {
            map.insert(STORED_ACCESS_TOKEN_KEY.to_string(), token.clone().into());
        }
        if let Some(token) = &self.refresh_token {
            map.insert(STORED_REFRESH_TOKEN_KEY.to_string(), token.clone().into());
        }
        if let Some(code) = &self.authorization_code {
            map.insert(
                STORED_AUTHORIZATION_CODE_KEY.to_string(),
                code.clone().into(),
            );
        }
        serde_json::Value::Object(map).to_string()
    }

    /// Whether a token-generation exchange is required before any other
    /// provider operation.
    ///
    /// True when an authorization code is present and no stored credential
    /// already consumed that same code. Comparing against the stored code is
    /// what prevents exchanging a one-time code twice.
    pub fn needs_token_generation(&self, stored: Option<&Credential>) -> bool {
        let Some(code) = self.authorization_code.as_deref() else {
            return false;
        };

        let result = match stored {
            Some(stored) => stored.authorization_code.as_deref() != Some(code),
            None => true,
        };

        debug!(result, "checked whether token generation is needed");
        result
    }

    /// Reconcile this credential with a newer snapshot.
    ///
    /// The newer access token always wins, even when absent. The refresh
    /// token and authorization code are only taken when the newer instance
    /// has them — a client request that omits the refresh token must not
    /// clobber the one loaded from storage.
    pub fn merge_newer(&mut self, newer: &Credential) {
        if let Some(refresh_token) = &newer.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        if let Some(code) = &newer.authorization_code {
            self.authorization_code = Some(code.clone());
        }
        self.access_token = newer.access_token.clone();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn authorization_code(&self) -> Option<&str> {
        self.authorization_code.as_deref()
    }

    /// Whether the one-shot refresh guard has fired.
    pub fn already_refreshed(&self) -> bool {
        self.already_refreshed
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
    }

    pub fn set_refresh_token(&mut self, token: impl Into<String>) {
        self.refresh_token = Some(token.into());
    }

    pub fn set_authorization_code(&mut self, code: impl Into<String>) {
        self.authorization_code = Some(code.into());
    }
}

// Token values must never leak into logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "authorization_code",
                &self.authorization_code.as_ref().map(|_| "[REDACTED]"),
            )
            .field("already_refreshed", &self.already_refreshed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_http::{HttpRequest, HttpResponse};

    struct UnreachableHttp;

    #[async_trait]
    impl HttpClient for UnreachableHttp {
        async fn execute(&self, _request: HttpRequest) -> bridge_http::Result<HttpResponse> {
            panic!("no HTTP call expected in credential state tests");
        }
    }

    fn credential() -> Credential {
        Credential::new(AccountConfig::default(), Arc::new(UnreachableHttp))
    }

    #[test]
    fn stored_form_round_trips_all_fields() {
        let mut original = credential();
        original.set_access_token("a1");
        original.set_refresh_token("r1");
        original.set_authorization_code("c1");

        let stored = original.to_stored();
        let decoded = Credential::from_stored(
            &stored,
            AccountConfig::default(),
            Arc::new(UnreachableHttp),
        )
        .unwrap();

        assert_eq!(decoded.access_token(), Some("a1"));
        assert_eq!(decoded.refresh_token(), Some("r1"));
        assert_eq!(decoded.authorization_code(), Some("c1"));
    }

    #[test]
    fn stored_form_omits_absent_fields() {
        let mut original = credential();
        original.set_access_token("a1");

        let stored = original.to_stored();
        assert!(!stored.contains("refreshToken"));
        assert!(!stored.contains("authorizationCode"));

        let decoded = Credential::from_stored(
            &stored,
            AccountConfig::default(),
            Arc::new(UnreachableHttp),
        )
        .unwrap();
        assert_eq!(decoded.access_token(), Some("a1"));
        assert!(decoded.refresh_token().is_none());
        assert!(decoded.authorization_code().is_none());
    }

    #[test]
    fn decode_requires_access_token() {
        let result = Credential::from_stored(
            r#"{"refreshToken":"r1"}"#,
            AccountConfig::default(),
            Arc::new(UnreachableHttp),
        );
        assert!(matches!(result, Err(CredentialError::Decode(_))));
    }

    #[test]
    fn decode_rejects_unparseable_input() {
        let result = Credential::from_stored(
            "not json",
            AccountConfig::default(),
            Arc::new(UnreachableHttp),
        );
        assert!(matches!(result, Err(CredentialError::Decode(_))));
    }

    #[test]
    fn properties_extraction_ignores_unknown_headers() {
        let mut headers = HashMap::new();
        headers.insert(ACCESS_TOKEN_PROPERTY.to_string(), "tok".to_string());
        headers.insert(
            AUTHORIZATION_CODE_PROPERTY.to_string(),
            "code".to_string(),
        );
        headers.insert("x-unrelated".to_string(), "noise".to_string());

        let properties = properties_from_headers(&headers);
        assert_eq!(properties.len(), 2);

        let credential = Credential::from_properties(
            &properties,
            AccountConfig::default(),
            Arc::new(UnreachableHttp),
        );
        assert_eq!(credential.access_token(), Some("tok"));
        assert_eq!(credential.authorization_code(), Some("code"));
        assert!(credential.refresh_token().is_none());
    }

    #[test]
    fn needs_token_generation_without_code_is_false() {
        let fresh = credential();
        assert!(!fresh.needs_token_generation(None));

        let mut stored = credential();
        stored.set_authorization_code("anything");
        assert!(!fresh.needs_token_generation(Some(&stored)));
    }

    #[test]
    fn needs_token_generation_with_code_and_no_stored() {
        let mut fresh = credential();
        fresh.set_authorization_code("X");
        assert!(fresh.needs_token_generation(None));
    }

    #[test]
    fn needs_token_generation_with_matching_stored_code() {
        let mut fresh = credential();
        fresh.set_authorization_code("X");

        let mut stored = credential();
        stored.set_authorization_code("X");
        assert!(!fresh.needs_token_generation(Some(&stored)));
    }

    #[test]
    fn needs_token_generation_with_differing_stored_code() {
        let mut fresh = credential();
        fresh.set_authorization_code("X");

        let mut stored = credential();
        stored.set_authorization_code("Y");
        assert!(fresh.needs_token_generation(Some(&stored)));
    }

    #[test]
    fn merge_keeps_old_values_when_newer_fields_are_absent() {
        let mut current = credential();
        current.set_access_token("a1");
        current.set_refresh_token("r1");
        current.set_authorization_code("c1");

        let mut newer = credential();
        newer.set_access_token("a2");

        current.merge_newer(&newer);
        assert_eq!(current.access_token(), Some("a2"));
        assert_eq!(current.refresh_token(), Some("r1"));
        assert_eq!(current.authorization_code(), Some("c1"));
    }

    #[test]
    fn merge_takes_newer_values_when_present() {
        let mut current = credential();
        current.set_access_token("a1");
        current.set_refresh_token("r1");

        let mut newer = credential();
        newer.set_refresh_token("r2");
        newer.set_authorization_code("c2");

        current.merge_newer(&newer);
        // The newer access token wins even when absent.
        assert!(current.access_token().is_none());
        assert_eq!(current.refresh_token(), Some("r2"));
        assert_eq!(current.authorization_code(), Some("c2"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut credential = credential();
        credential.set_access_token("secret_access");
        credential.set_refresh_token("secret_refresh");

        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret_access"));
        assert!(!rendered.contains("secret_refresh"));
    }
}

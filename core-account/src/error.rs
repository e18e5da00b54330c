use bridge_http::HttpError;
use thiserror::Error;

/// Failures of the token-minting paths (`generate_tokens` / `refresh`).
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no client id or client secret configured")]
    MissingClientConfig,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token endpoint returned status {0}")]
    BadStatus(u16),

    #[error("token endpoint response missing expected token fields")]
    MalformedTokenResponse,

    #[error("refresh token expired or revoked")]
    ExpiredOrRevoked,

    #[error("delegate failed to persist credential")]
    PersistFailed,

    #[error("stored credential could not be decoded: {0}")]
    Decode(String),

    #[error("token request encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] HttpError),
}

/// Terminal outcomes of an authenticated call.
///
/// Ordinary non-success statuses are not errors — they come back to the
/// caller as plain responses. Only the two outcomes that end the whole call
/// chain (plus transport failure) surface here.
#[derive(Error, Debug)]
pub enum ApiCallError {
    /// The access token is unusable and could not be refreshed: the provider
    /// reported the grant expired or revoked, or answered with the
    /// anonymous-use limit shape that signals the same condition. The caller
    /// must re-authenticate the account.
    #[error("access token expired or revoked")]
    AccessTokenRevoked,

    /// The refresh attempt failed for a reason other than revocation.
    #[error("failed to refresh access token")]
    RefreshFailed(#[source] CredentialError),

    #[error(transparent)]
    Transport(#[from] HttpError),
}

pub type Result<T, E = CredentialError> = std::result::Result<T, E>;

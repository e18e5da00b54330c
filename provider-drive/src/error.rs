//! Error types for Drive storage operations.

use bridge_http::HttpError;
use core_account::{ApiCallError, CredentialError};
use thiserror::Error;

/// Drive storage operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The access token is unusable and refresh is impossible; the account
    /// must be re-authenticated. Covers both an explicit revocation from the
    /// token endpoint and the provider's anonymous-use limit response.
    #[error("access token expired or revoked")]
    AccessTokenRevoked,

    /// The automatic access-token refresh failed for a non-revocation reason.
    #[error("access token refresh failed")]
    RefreshFailed(#[source] CredentialError),

    /// A file with this name already exists in the target folder.
    #[error("file already exists in cloud storage")]
    AlreadyUploaded,

    #[error("file not found")]
    FileNotFound,

    /// The provider's upload response did not include a checksum.
    #[error("upload response missing checksum")]
    MissingChecksum,

    #[error("drive API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse drive response: {0}")]
    Parse(String),

    #[error(transparent)]
    Transport(HttpError),
}

impl From<ApiCallError> for StorageError {
    fn from(error: ApiCallError) -> Self {
        match error {
            ApiCallError::AccessTokenRevoked => StorageError::AccessTokenRevoked,
            ApiCallError::RefreshFailed(source) => StorageError::RefreshFailed(source),
            ApiCallError::Transport(source) => StorageError::Transport(source),
        }
    }
}

/// Result type for Drive storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

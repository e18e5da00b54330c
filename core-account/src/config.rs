//! Server-side OAuth client configuration.

use serde::Deserialize;

use crate::error::{CredentialError, Result};

/// Client identifier and secret for the provider's token endpoint.
///
/// Both values are optional at construction so that deployments which never
/// mint tokens (e.g. read-only test rigs) can run without them; any
/// token-minting path fails with [`CredentialError::MissingClientConfig`]
/// when either is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AccountConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
        }
    }

    /// Read `DRIVE_CLIENT_ID` / `DRIVE_CLIENT_SECRET` from the environment.
    /// Missing variables leave the corresponding field unset.
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("DRIVE_CLIENT_ID").ok(),
            client_secret: std::env::var("DRIVE_CLIENT_SECRET").ok(),
        }
    }

    /// Both values, or the configuration error every minting path reports.
    pub(crate) fn require(&self) -> Result<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
            _ => Err(CredentialError::MissingClientConfig),
        }
    }
}

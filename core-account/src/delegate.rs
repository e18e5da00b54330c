//! Persistence capability injected by the host.

use crate::credential::Credential;

/// Saves a credential's current tokens to durable storage.
///
/// The core holds this collaborator through a non-owning reference and never
/// manages its lifetime. After a successful token mint or refresh the core
/// calls [`save`](CredentialDelegate::save); `false` means the save did not
/// complete and is reported to the caller as a persistence error. A
/// credential with no delegate at all still refreshes successfully — the new
/// tokens just live only as long as the credential does.
pub trait CredentialDelegate: Send + Sync {
    fn save(&self, credential: &Credential) -> bool;
}

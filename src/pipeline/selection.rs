//! Provider selection: primary credential, then fallback, else skip.

use crate::credentials::EncryptedCredential;
use crate::llm::ProviderRole;
use crate::store::{GardenStore, StoreError};

/// The role chosen for a user and its stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub role: ProviderRole,
    pub credential: EncryptedCredential,
}

/// Pick the provider for `user_id`. `None` means the zone is skipped.
pub async fn select_provider(
    store: &dyn GardenStore,
    user_id: &str,
) -> Result<Option<Selection>, StoreError> {
    for role in [ProviderRole::Primary, ProviderRole::Fallback] {
        if let Some(credential) = store.provider_credential(user_id, role).await? {
            return Ok(Some(Selection { role, credential }));
        }
    }
    Ok(None)
}

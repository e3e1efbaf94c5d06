use async_trait::async_trait;

use crate::passkey::{Credential, CredentialId};
use crate::storage::errors::StorageError;

/// Holds enrolled credentials per user.
///
/// Credential ids are unique across all users. Mutations on one username are
/// atomic with respect to each other; different usernames do not contend.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Credentials enrolled for `username`, in enrollment order.
    async fn credentials_for(&self, username: &str) -> Result<Vec<Credential>, StorageError>;

    /// Insert under `credential.owner_username`, rejecting an id already present anywhere.
    async fn add(&self, credential: Credential) -> Result<(), StorageError>;

    /// Overwrite the stored counter. Monotonicity is the caller's responsibility.
    async fn update_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StorageError>;

    /// Set the counter to `new_counter` only if it still equals `expected`.
    ///
    /// Returns `Ok(false)` without writing when another writer got there first.
    /// Also stamps `last_used_at` on success.
    async fn compare_and_update_counter(
        &self,
        credential_id: &CredentialId,
        expected: u32,
        new_counter: u32,
    ) -> Result<bool, StorageError>;

    async fn find_by_id_for_user(
        &self,
        username: &str,
        credential_id: &CredentialId,
    ) -> Result<Credential, StorageError>;
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::passkey::{Credential, CredentialId};
use crate::storage::errors::StorageError;

use super::types::CredentialStore;

/// In-memory credential store.
///
/// `by_user` holds each user's credential list; its sharded entries give the
/// per-username exclusive section for read-modify-write. `owners` indexes every
/// credential id to its owner and enforces global uniqueness. Lock order is
/// always `owners` then `by_user`.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_user: DashMap<String, Vec<Credential>>,
    owners: DashMap<CredentialId, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential store");
        Self::default()
    }

    fn owner_of(&self, credential_id: &CredentialId) -> Result<String, StorageError> {
        self.owners
            .get(credential_id)
            .map(|owner| owner.value().clone())
            .ok_or_else(|| StorageError::UnknownCredential(credential_id.to_string()))
    }

    /// Run `f` on the stored credential inside its owner's exclusive section.
    fn with_credential_mut<T>(
        &self,
        credential_id: &CredentialId,
        f: impl FnOnce(&mut Credential) -> T,
    ) -> Result<T, StorageError> {
        let owner = self.owner_of(credential_id)?;
        let mut credentials = self
            .by_user
            .get_mut(&owner)
            .ok_or_else(|| StorageError::UnknownCredential(credential_id.to_string()))?;
        let credential = credentials
            .iter_mut()
            .find(|c| &c.id == credential_id)
            .ok_or_else(|| StorageError::UnknownCredential(credential_id.to_string()))?;
        Ok(f(credential))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credentials_for(&self, username: &str) -> Result<Vec<Credential>, StorageError> {
        Ok(self
            .by_user
            .get(username)
            .map(|credentials| credentials.value().clone())
            .unwrap_or_default())
    }

    async fn add(&self, credential: Credential) -> Result<(), StorageError> {
        match self.owners.entry(credential.id.clone()) {
            Entry::Occupied(existing) => {
                tracing::warn!(
                    "Credential {} already enrolled (owner: {})",
                    credential.id,
                    existing.get()
                );
                Err(StorageError::DuplicateCredentialId(credential.id.to_string()))
            }
            Entry::Vacant(slot) => {
                let owner = credential.owner_username.clone();
                tracing::debug!("Storing credential {} for {}", credential.id, owner);
                self.by_user
                    .entry(owner.clone())
                    .or_default()
                    .push(credential);
                slot.insert(owner);
                Ok(())
            }
        }
    }

    async fn update_counter(
        &self,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StorageError> {
        self.with_credential_mut(credential_id, |credential| {
            credential.signature_counter = new_counter;
        })
    }

    async fn compare_and_update_counter(
        &self,
        credential_id: &CredentialId,
        expected: u32,
        new_counter: u32,
    ) -> Result<bool, StorageError> {
        self.with_credential_mut(credential_id, |credential| {
            if credential.signature_counter != expected {
                return false;
            }
            credential.signature_counter = new_counter;
            credential.last_used_at = Some(Utc::now());
            true
        })
    }

    async fn find_by_id_for_user(
        &self,
        username: &str,
        credential_id: &CredentialId,
    ) -> Result<Credential, StorageError> {
        self.by_user
            .get(username)
            .and_then(|credentials| {
                credentials
                    .iter()
                    .find(|c| &c.id == credential_id)
                    .cloned()
            })
            .ok_or_else(|| StorageError::UnknownCredential(credential_id.to_string()))
    }
}

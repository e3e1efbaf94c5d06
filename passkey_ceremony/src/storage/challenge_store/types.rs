use async_trait::async_trait;

use crate::passkey::{Ceremony, CeremonyId, CeremonyKind};
use crate::storage::errors::StorageError;

/// Issues and consumes single-use, time-bounded ceremony challenges.
#[async_trait]
pub trait ChallengeStore: Send + Sync + 'static {
    /// Generate a random challenge, assign its expiry and record it as pending.
    async fn create(
        &self,
        kind: CeremonyKind,
        username: Option<String>,
    ) -> Result<Ceremony, StorageError>;

    /// Remove and return the pending ceremony.
    ///
    /// Fails with [`StorageError::ChallengeNotFound`] when the id is unknown,
    /// already consumed, or expired. Under concurrent calls with the same id at
    /// most one caller observes success.
    async fn consume(&self, id: &CeremonyId) -> Result<Ceremony, StorageError>;

    /// Drop every expired record. Returns how many were reclaimed.
    async fn purge_expired(&self) -> Result<usize, StorageError>;

    /// Number of records currently held, expired or not.
    async fn pending_count(&self) -> Result<usize, StorageError>;
}

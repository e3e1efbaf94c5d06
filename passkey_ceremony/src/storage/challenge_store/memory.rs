use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::config::RelyingPartyPolicy;
use crate::passkey::{Ceremony, CeremonyId, CeremonyKind};
use crate::storage::errors::StorageError;
use crate::utils::{gen_random_bytes, gen_random_string};

use super::types::ChallengeStore;

/// Default lifetime of an issued challenge (5 minutes)
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

const CHALLENGE_LEN: usize = 32;
const CEREMONY_ID_LEN: usize = 16;

/// In-memory challenge store keyed by ceremony id.
///
/// The store owns the challenge lifetime; build it with
/// [`InMemoryChallengeStore::from_policy`] so `challenge_ttl` takes effect.
/// Expired records are reclaimed lazily by `consume` and in bulk by
/// `purge_expired`.
pub struct InMemoryChallengeStore {
    pending: DashMap<CeremonyId, Ceremony>,
    ttl: Duration,
}

impl InMemoryChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        tracing::info!("Creating new in-memory challenge store (ttl: {}s)", ttl.num_seconds());
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Store whose challenges live for the policy's `challenge_ttl`.
    pub fn from_policy(policy: &RelyingPartyPolicy) -> Self {
        Self::new(policy.challenge_ttl)
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, ceremony: Ceremony) {
        self.pending.insert(ceremony.id.clone(), ceremony);
    }
}

impl Default for InMemoryChallengeStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS))
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn create(
        &self,
        kind: CeremonyKind,
        username: Option<String>,
    ) -> Result<Ceremony, StorageError> {
        let challenge =
            gen_random_bytes(CHALLENGE_LEN).map_err(|e| StorageError::Backend(e.to_string()))?;
        let id = CeremonyId::new(
            gen_random_string(CEREMONY_ID_LEN).map_err(|e| StorageError::Backend(e.to_string()))?,
        );

        let now = Utc::now();
        let ceremony = Ceremony {
            id: id.clone(),
            kind,
            challenge,
            username,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.pending.insert(id, ceremony.clone());
        tracing::debug!("Created {:?} ceremony {}", kind, ceremony.id);

        Ok(ceremony)
    }

    async fn consume(&self, id: &CeremonyId) -> Result<Ceremony, StorageError> {
        // DashMap::remove is atomic per key, so only one caller can take the record.
        let (_, ceremony) = self
            .pending
            .remove(id)
            .ok_or_else(|| StorageError::ChallengeNotFound(id.to_string()))?;

        if ceremony.is_expired_at(Utc::now()) {
            tracing::warn!(
                "Ceremony {} expired at {}, discarding",
                id,
                ceremony.expires_at
            );
            return Err(StorageError::ChallengeNotFound(id.to_string()));
        }

        Ok(ceremony)
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let before = self.pending.len();
        self.pending.retain(|_, ceremony| !ceremony.is_expired_at(now));
        let purged = before.saturating_sub(self.pending.len());
        if purged > 0 {
            tracing::debug!("Purged {} expired ceremonies", purged);
        }
        Ok(purged)
    }

    async fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.pending.len())
    }
}

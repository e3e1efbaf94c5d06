use crate::passkey::errors::CeremonyError;
use crate::passkey::types::{Ceremony, CeremonyId, CeremonyKind};
use crate::storage::ChallengeStore;

/// Consumes the pending ceremony and checks it was issued for `kind`.
///
/// The record is gone after this call whatever the outcome, so a ceremony id
/// can never be completed twice.
pub(super) async fn take_ceremony(
    challenges: &dyn ChallengeStore,
    ceremony_id: &CeremonyId,
    kind: CeremonyKind,
) -> Result<Ceremony, CeremonyError> {
    let ceremony = challenges.consume(ceremony_id).await.map_err(|e| {
        tracing::warn!("Rejected {:?} ceremony {}: {}", kind, ceremony_id, e);
        CeremonyError::from(e)
    })?;

    if ceremony.kind != kind {
        tracing::warn!(
            "Ceremony {} was issued for {:?}, not {:?}",
            ceremony_id,
            ceremony.kind,
            kind
        );
        return Err(CeremonyError::InvalidChallenge(format!(
            "Ceremony was issued for {:?}",
            ceremony.kind
        )));
    }

    tracing::debug!("Consumed {:?} ceremony {}", kind, ceremony_id);
    Ok(ceremony)
}

use thiserror::Error;

use crate::storage::StorageError;
use crate::utils::UtilError;

/// Errors that can terminate a registration or assertion ceremony.
///
/// Every variant is terminal for the ceremony instance; callers start a fresh
/// ceremony rather than retrying. [`CeremonyError::CounterRegression`] is the
/// one security-significant outcome and can be told apart with
/// [`CeremonyError::is_security_alert`].
#[derive(Debug, Error)]
pub enum CeremonyError {
    /// The ceremony id is missing, expired, already consumed, or belongs to another flow
    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    /// clientDataJSON carries the wrong ceremony type or a challenge other than the issued one
    #[error("Challenge mismatch: {0}")]
    ChallengeMismatch(String),

    /// clientDataJSON origin is not one of the accepted origins
    #[error("Invalid origin. Expected one of {expected:?}, got {got}")]
    OriginMismatch { expected: Vec<String>, got: String },

    /// Authenticator data rpIdHash is not SHA-256 of the configured RP ID
    #[error("RP ID mismatch: {0}")]
    RpIdMismatch(String),

    /// The attestation statement failed verification or the attestation policy refused it
    #[error("Attestation rejected: {0}")]
    AttestationRejected(String),

    /// The credential id is already enrolled somewhere in the store
    #[error("Duplicate credential id: {0}")]
    DuplicateCredentialId(String),

    /// The credential id is not enrolled for the given user
    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    /// The assertion signature does not verify under the stored public key
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// The signature counter did not advance; the authenticator may have been cloned
    #[error("Counter regression - stored: {stored}, received: {received}")]
    CounterRegression { stored: u32, received: u32 },

    /// User presence / user verification flags do not satisfy the policy
    #[error("User presence error: {0}")]
    UserPresence(String),

    /// The COSE algorithm is not supported or not accepted by the policy
    #[error("Unsupported COSE algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    /// Undecodable client data, CBOR, or authenticator data
    #[error("Invalid format: {0}")]
    Malformed(String),

    /// Invalid relying-party policy
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure of the randomness source
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Failure inside a store backend
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CeremonyError {
    /// True when the failure suggests a cloned authenticator and the caller
    /// may want to alert on or lock the account.
    pub fn is_security_alert(&self) -> bool {
        matches!(self, CeremonyError::CounterRegression { .. })
    }
}

impl From<StorageError> for CeremonyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateCredentialId(id) => Self::DuplicateCredentialId(id),
            StorageError::UnknownCredential(id) => Self::UnknownCredential(id),
            StorageError::ChallengeNotFound(id) => {
                Self::InvalidChallenge(format!("Challenge not found: {id}"))
            }
            StorageError::Backend(e) => Self::Storage(e),
        }
    }
}

impl From<UtilError> for CeremonyError {
    fn from(err: UtilError) -> Self {
        match err {
            UtilError::Crypto(e) => Self::Crypto(e),
            UtilError::Format(e) => Self::Malformed(e),
        }
    }
}

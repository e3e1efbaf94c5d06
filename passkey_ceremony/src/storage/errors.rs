use thiserror::Error;

/// Errors surfaced by challenge and credential store implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// The credential id is already enrolled, for this or any other user
    #[error("Duplicate credential id: {0}")]
    DuplicateCredentialId(String),

    /// No credential with this id is enrolled (for the requested user)
    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    /// The ceremony id is unknown, already consumed, or expired
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    /// Failure inside a backend implementation
    #[error("Storage error: {0}")]
    Backend(String),
}

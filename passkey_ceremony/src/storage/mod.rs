mod challenge_store;
mod credential_store;
mod errors;

pub use challenge_store::{ChallengeStore, DEFAULT_CHALLENGE_TTL_SECS, InMemoryChallengeStore};
pub use credential_store::{CredentialStore, InMemoryCredentialStore};
pub use errors::StorageError;

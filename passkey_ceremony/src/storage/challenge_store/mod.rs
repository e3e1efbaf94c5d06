mod memory;
mod types;

pub use memory::{DEFAULT_CHALLENGE_TTL_SECS, InMemoryChallengeStore};
pub use types::ChallengeStore;

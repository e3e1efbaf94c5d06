mod memory;
mod types;

pub use memory::InMemoryCredentialStore;
pub use types::CredentialStore;

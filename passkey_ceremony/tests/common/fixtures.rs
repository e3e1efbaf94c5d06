use std::sync::Arc;

use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{
    AssertionCeremony, CeremonyError, Credential, InMemoryChallengeStore, InMemoryCredentialStore,
    RegistrationCeremony, RelyingPartyPolicy,
};

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";

pub fn test_policy() -> RelyingPartyPolicy {
    RelyingPartyPolicy::new(RP_ID, "Example", ORIGIN)
}

/// Both ceremonies wired to one pair of shared stores.
pub struct TestRelyingParty {
    pub challenges: Arc<InMemoryChallengeStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub registration: RegistrationCeremony,
    pub assertion: AssertionCeremony,
}

impl TestRelyingParty {
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    pub fn with_policy(policy: RelyingPartyPolicy) -> Self {
        let challenges = Arc::new(InMemoryChallengeStore::from_policy(&policy));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let registration =
            RegistrationCeremony::new(policy.clone(), challenges.clone(), credentials.clone())
                .expect("valid policy");
        let assertion = AssertionCeremony::new(policy, challenges.clone(), credentials.clone())
            .expect("valid policy");
        Self {
            challenges,
            credentials,
            registration,
            assertion,
        }
    }

    /// Run a full registration ceremony for `username` with `authenticator`.
    pub async fn enroll(
        &self,
        username: &str,
        authenticator: &SoftAuthenticator,
    ) -> Result<Credential, CeremonyError> {
        let (options, ceremony_id) = self
            .registration
            .generate_options(username, username)
            .await?;
        let response = authenticator.register(&options, ORIGIN)?;
        self.registration.complete(&response, &ceremony_id).await
    }

    /// Run a full assertion ceremony reporting `counter`.
    pub async fn login(
        &self,
        username: &str,
        authenticator: &SoftAuthenticator,
        counter: u32,
    ) -> Result<Credential, CeremonyError> {
        let (options, ceremony_id) = self.assertion.generate_options(username).await?;
        let response = authenticator.assert(&options, ORIGIN, counter)?;
        self.assertion
            .complete(&response, &ceremony_id, username)
            .await
    }
}

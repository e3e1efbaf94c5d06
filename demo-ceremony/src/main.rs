use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{
    AssertionCeremony, CeremonyError, InMemoryChallengeStore, InMemoryCredentialStore,
    RegistrationCeremony, RelyingPartyPolicy,
};

const USERNAME: &str = "alice";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,passkey_ceremony=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let policy = match RelyingPartyPolicy::from_env() {
        Ok(policy) => policy,
        Err(e) => {
            tracing::info!("{}; using localhost defaults", e);
            RelyingPartyPolicy::new("localhost", "Passkey Demo", "http://localhost:3000")
        }
    };
    let origin = policy.origins[0].clone();

    let challenges = Arc::new(InMemoryChallengeStore::from_policy(&policy));
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let registration =
        RegistrationCeremony::new(policy.clone(), challenges.clone(), credentials.clone())?;
    let assertion = AssertionCeremony::new(policy, challenges, credentials)?;

    let authenticator = SoftAuthenticator::es256()?;

    // Registration
    let (options, ceremony_id) = registration
        .generate_options(USERNAME, "Alice")
        .await?;
    tracing::debug!(
        "Creation options: {}",
        serde_json::to_string_pretty(&options)?
    );
    let response = authenticator.register(&options, &origin)?;
    let credential = registration.complete(&response, &ceremony_id).await?;
    println!(
        "Registered credential {} for {} (aaguid {})",
        credential.id, credential.owner_username, credential.aaguid
    );

    // Authentication
    let (options, ceremony_id) = assertion.generate_options(USERNAME).await?;
    let response = authenticator.assert(&options, &origin, 1)?;
    let credential = assertion
        .complete(&response, &ceremony_id, USERNAME)
        .await?;
    println!(
        "Authenticated {}, signature counter now {}",
        USERNAME, credential.signature_counter
    );

    // Replaying the same assertion must fail
    match assertion.complete(&response, &ceremony_id, USERNAME).await {
        Err(e @ CeremonyError::InvalidChallenge(_)) => println!("Replay rejected: {e}"),
        other => return Err(format!("Replay was not rejected: {other:?}").into()),
    }

    // A cloned authenticator reporting a stale counter
    let (options, ceremony_id) = assertion.generate_options(USERNAME).await?;
    let response = authenticator.assert(&options, &origin, 1)?;
    match assertion.complete(&response, &ceremony_id, USERNAME).await {
        Err(e) if e.is_security_alert() => println!("Clone detected: {e}"),
        other => return Err(format!("Stale counter was accepted: {other:?}").into()),
    }

    Ok(())
}

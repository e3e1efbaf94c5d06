use proptest::prelude::*;

use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{CeremonyError, CredentialStore};

use crate::common::{ORIGIN, TestRelyingParty};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Flipping any bits of any single challenge byte fails the registration
    #[test]
    fn test_altered_challenge_byte_is_rejected(index in 0usize..32, mask in 1u8..=255) {
        let result = runtime().block_on(async {
            let rp = TestRelyingParty::new();
            let authenticator = SoftAuthenticator::es256().unwrap();
            let (options, ceremony_id) = rp
                .registration
                .generate_options("alice", "Alice")
                .await?;

            let mut challenge = options.challenge.clone();
            let len = challenge.len();
            challenge[index % len] ^= mask;
            let client_data = SoftAuthenticator::client_data("webauthn.create", &challenge, ORIGIN);
            let response = authenticator.register_with_client_data(&options, client_data)?;

            let result = rp.registration.complete(&response, &ceremony_id).await;
            let enrolled = rp.credentials.credentials_for("alice").await?;
            Ok::<_, CeremonyError>((result, enrolled.len()))
        });

        let (result, enrolled) = result.expect("ceremony setup");
        prop_assert!(matches!(result, Err(CeremonyError::ChallengeMismatch(_))), "got {:?}", result);
        prop_assert_eq!(enrolled, 0);
    }

    /// Over any counter sequence the stored counter only moves forward, and
    /// every non-advancing non-zero counter is reported as a regression.
    #[test]
    fn test_stored_counter_never_decreases(counters in prop::collection::vec(0u32..20, 1..8)) {
        let outcomes = runtime().block_on(async {
            let rp = TestRelyingParty::new();
            let authenticator = SoftAuthenticator::es256().unwrap();
            rp.enroll("alice", &authenticator).await?;

            let mut outcomes = Vec::new();
            for counter in &counters {
                let result = rp.login("alice", &authenticator, *counter).await;
                let stored = rp.credentials.credentials_for("alice").await?[0].signature_counter;
                outcomes.push((*counter, result.map(|c| c.signature_counter), stored));
            }
            Ok::<_, CeremonyError>(outcomes)
        })
        .expect("ceremony setup");

        let mut expected_stored = 0u32;
        for (received, result, stored) in outcomes {
            let advances = received > expected_stored || received == 0 || expected_stored == 0;
            if advances {
                prop_assert_eq!(result.ok(), Some(received));
                expected_stored = received;
            } else {
                let is_regression = matches!(result, Err(CeremonyError::CounterRegression { .. }));
                prop_assert!(is_regression);
            }
            prop_assert_eq!(stored, expected_stored);
        }
    }
}

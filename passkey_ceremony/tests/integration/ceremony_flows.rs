use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{
    AssertionCeremony, CeremonyError, ChallengeStore, CredentialStore, RelyingPartyPolicy,
    UserVerification,
};

use crate::common::{ORIGIN, RP_ID, TestRelyingParty, test_policy};

/// Register, log in, replay the login and then present a stale counter.
#[tokio::test]
async fn test_register_then_authenticate_then_replay() {
    let rp = TestRelyingParty::new();
    let authenticator = SoftAuthenticator::es256().unwrap();

    // Given alice enrolls one credential
    println!("Step: registering alice");
    let credential = rp.enroll("alice", &authenticator).await.unwrap();
    assert_eq!(credential.signature_counter, 0);
    assert_eq!(credential.owner_username, "alice");
    assert_eq!(credential.aaguid, SoftAuthenticator::AAGUID);
    assert_eq!(credential.id.as_bytes(), authenticator.credential_id());

    // When she requests login options, exactly that credential is allowed
    let (options, ceremony_id) = rp.assertion.generate_options("alice").await.unwrap();
    assert_eq!(options.rp_id, RP_ID);
    assert_eq!(options.allow_credentials.len(), 1);
    assert_eq!(options.allow_credentials[0].id, credential.id);

    // Then an assertion with counter 1 succeeds and advances the counter
    println!("Step: authenticating with counter 1");
    let response = authenticator.assert(&options, ORIGIN, 1).unwrap();
    let updated = rp
        .assertion
        .complete(&response, &ceremony_id, "alice")
        .await
        .unwrap();
    assert_eq!(updated.signature_counter, 1);
    assert!(updated.last_used_at.is_some());

    // And replaying the same payload fails on the consumed challenge
    println!("Step: replaying the assertion");
    let replay = rp.assertion.complete(&response, &ceremony_id, "alice").await;
    assert!(matches!(replay, Err(CeremonyError::InvalidChallenge(_))));

    // And a fresh ceremony presenting the same counter is flagged as a clone
    println!("Step: authenticating again with counter 1");
    let stale = rp.login("alice", &authenticator, 1).await;
    match stale {
        Err(e @ CeremonyError::CounterRegression { stored: 1, received: 1 }) => {
            assert!(e.is_security_alert());
        }
        other => panic!("expected counter regression, got {other:?}"),
    }

    // The rejected assertion wrote nothing
    let stored = rp.credentials.credentials_for("alice").await.unwrap();
    assert_eq!(stored[0].signature_counter, 1);
    assert_eq!(rp.challenges.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_every_algorithm_round_trips() {
    let policy = test_policy().with_algorithms(vec![
        passkey_ceremony::CoseAlgorithm::ES256,
        passkey_ceremony::CoseAlgorithm::ES384,
        passkey_ceremony::CoseAlgorithm::EdDSA,
    ]);
    let rp = TestRelyingParty::with_policy(policy);

    for (i, authenticator) in [
        SoftAuthenticator::es256().unwrap(),
        SoftAuthenticator::es384().unwrap(),
        SoftAuthenticator::ed25519().unwrap().with_self_attestation(),
    ]
    .iter()
    .enumerate()
    {
        let username = format!("user{i}");
        rp.enroll(&username, authenticator).await.unwrap();
        let credential = rp.login(&username, authenticator, 10).await.unwrap();
        assert_eq!(credential.signature_counter, 10);
    }
}

#[tokio::test]
async fn test_exclude_list_is_snapshot_at_options_time() {
    let rp = TestRelyingParty::new();
    let first = SoftAuthenticator::es256().unwrap();
    let second = SoftAuthenticator::ed25519().unwrap();

    // Given options issued before any credential exists
    let (early_options, early_id) = rp
        .registration
        .generate_options("bob", "Bob")
        .await
        .unwrap();
    assert!(early_options.exclude_credentials.is_empty());

    // When a credential is enrolled through a later ceremony
    rp.enroll("bob", &first).await.unwrap();

    // Then the earlier options are unchanged and still complete
    assert!(early_options.exclude_credentials.is_empty());
    let response = second.register(&early_options, ORIGIN).unwrap();
    rp.registration
        .complete(&response, &early_id)
        .await
        .unwrap();

    // And new options exclude both credentials in enrollment order
    let (options, _) = rp
        .registration
        .generate_options("bob", "Bob")
        .await
        .unwrap();
    let excluded: Vec<_> = options
        .exclude_credentials
        .iter()
        .map(|d| d.id.as_bytes().to_vec())
        .collect();
    assert_eq!(
        excluded,
        vec![first.credential_id().to_vec(), second.credential_id().to_vec()]
    );
}

#[tokio::test]
async fn test_credential_id_is_unique_across_users() {
    let rp = TestRelyingParty::new();
    let authenticator = SoftAuthenticator::es256().unwrap();

    rp.enroll("alice", &authenticator).await.unwrap();
    let duplicate = rp.enroll("carol", &authenticator).await;
    assert!(matches!(
        duplicate,
        Err(CeremonyError::DuplicateCredentialId(_))
    ));
    assert!(rp.credentials.credentials_for("carol").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credential_of_other_user_is_unknown() {
    let rp = TestRelyingParty::new();
    let alice_key = SoftAuthenticator::es256().unwrap();
    let bob_key = SoftAuthenticator::es256().unwrap();
    rp.enroll("alice", &alice_key).await.unwrap();
    rp.enroll("bob", &bob_key).await.unwrap();

    // Alice's authenticator answers a ceremony issued for bob
    let (options, ceremony_id) = rp.assertion.generate_options("bob").await.unwrap();
    let response = alice_key.assert(&options, ORIGIN, 1).unwrap();
    let result = rp.assertion.complete(&response, &ceremony_id, "bob").await;
    assert!(matches!(result, Err(CeremonyError::UnknownCredential(_))));
}

#[tokio::test]
async fn test_registration_challenge_cannot_complete_assertion() {
    let rp = TestRelyingParty::new();
    let authenticator = SoftAuthenticator::es256().unwrap();
    rp.enroll("alice", &authenticator).await.unwrap();

    let (_, registration_id) = rp
        .registration
        .generate_options("alice", "Alice")
        .await
        .unwrap();
    let (options, _) = rp.assertion.generate_options("alice").await.unwrap();
    let response = authenticator.assert(&options, ORIGIN, 1).unwrap();

    let result = rp
        .assertion
        .complete(&response, &registration_id, "alice")
        .await;
    assert!(matches!(result, Err(CeremonyError::InvalidChallenge(_))));
}

#[tokio::test]
async fn test_uv_required_rejects_presence_only_registration() {
    let rp = TestRelyingParty::with_policy(
        test_policy().with_user_verification(UserVerification::Required),
    );

    rp.enroll("alice", &SoftAuthenticator::es256().unwrap())
        .await
        .unwrap();

    let presence_only = SoftAuthenticator::es256()
        .unwrap()
        .without_user_verification();
    let result = rp.enroll("dave", &presence_only).await;
    assert!(matches!(result, Err(CeremonyError::UserPresence(_))));
    assert!(rp.credentials.credentials_for("dave").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_uv_required_rejects_presence_only_assertion() {
    // Given dave enrolled a presence-only authenticator while UV was preferred
    let rp = TestRelyingParty::with_policy(
        test_policy().with_user_verification(UserVerification::Preferred),
    );
    let presence_only = SoftAuthenticator::es256()
        .unwrap()
        .without_user_verification();
    rp.enroll("dave", &presence_only).await.unwrap();
    rp.login("dave", &presence_only, 1).await.unwrap();

    // When the relying party starts requiring UV over the same stores
    let strict = AssertionCeremony::new(
        test_policy().with_user_verification(UserVerification::Required),
        rp.challenges.clone(),
        rp.credentials.clone(),
    )
    .unwrap();
    let (options, ceremony_id) = strict.generate_options("dave").await.unwrap();
    let response = presence_only.assert(&options, ORIGIN, 2).unwrap();

    // Then his assertion without UV is refused and the counter stays put
    let result = strict.complete(&response, &ceremony_id, "dave").await;
    assert!(matches!(result, Err(CeremonyError::UserPresence(_))));
    let stored = rp.credentials.credentials_for("dave").await.unwrap();
    assert_eq!(stored[0].signature_counter, 1);
}

#[tokio::test]
async fn test_additional_origin_is_accepted() {
    let policy = RelyingPartyPolicy::new(RP_ID, "Example", ORIGIN)
        .with_origin("https://login.example.com");
    let rp = TestRelyingParty::with_policy(policy);
    let authenticator = SoftAuthenticator::es256().unwrap();

    let (options, ceremony_id) = rp
        .registration
        .generate_options("erin", "Erin")
        .await
        .unwrap();
    let response = authenticator
        .register(&options, "https://login.example.com")
        .unwrap();
    rp.registration
        .complete(&response, &ceremony_id)
        .await
        .unwrap();

    let (options, ceremony_id) = rp.assertion.generate_options("erin").await.unwrap();
    let response = authenticator
        .assert(&options, "https://evil.example.net", 1)
        .unwrap();
    let result = rp.assertion.complete(&response, &ceremony_id, "erin").await;
    assert!(matches!(result, Err(CeremonyError::OriginMismatch { .. })));
}

#[tokio::test]
async fn test_options_serialize_as_webauthn_json() {
    let rp = TestRelyingParty::new();
    let (options, _) = rp
        .registration
        .generate_options("alice", "Alice Liddell")
        .await
        .unwrap();

    let json = serde_json::to_value(&options).unwrap();
    assert_eq!(json["rp"]["id"], RP_ID);
    assert_eq!(json["user"]["name"], "alice");
    assert_eq!(json["user"]["displayName"], "Alice Liddell");
    assert_eq!(json["pubKeyCredParams"][0]["type"], "public-key");
    assert_eq!(json["pubKeyCredParams"][0]["alg"], -7);
    assert!(json["challenge"].is_string());
    assert!(json["excludeCredentials"].as_array().unwrap().is_empty());
}

use std::sync::Arc;

use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{CeremonyError, CredentialStore};

use crate::common::{ORIGIN, TestRelyingParty};

/// Two completions racing on one ceremony id: exactly one may win.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_completion_has_single_winner() {
    let rp = Arc::new(TestRelyingParty::new());
    let authenticator = SoftAuthenticator::es256().unwrap();
    rp.enroll("alice", &authenticator).await.unwrap();

    let (options, ceremony_id) = rp.assertion.generate_options("alice").await.unwrap();
    let response = authenticator.assert(&options, ORIGIN, 1).unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let rp = rp.clone();
            let response = response.clone();
            let ceremony_id = ceremony_id.clone();
            tokio::spawn(async move {
                rp.assertion
                    .complete(&response, &ceremony_id, "alice")
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(credential) => {
                assert_eq!(credential.signature_counter, 1);
                successes += 1;
            }
            Err(e) => assert!(
                matches!(e, CeremonyError::InvalidChallenge(_)),
                "loser must see a consumed challenge, got {e:?}"
            ),
        }
    }
    assert_eq!(successes, 1);
}

/// Two assertions with the same counter on separate ceremonies: the counter
/// write is compare-and-set, so at most one is accepted.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_assertions_do_not_both_advance_counter() {
    let rp = Arc::new(TestRelyingParty::new());
    let authenticator = Arc::new(SoftAuthenticator::es256().unwrap());
    rp.enroll("alice", &authenticator).await.unwrap();

    let mut prepared = Vec::new();
    for _ in 0..2 {
        let (options, ceremony_id) = rp.assertion.generate_options("alice").await.unwrap();
        let response = authenticator.assert(&options, ORIGIN, 5).unwrap();
        prepared.push((response, ceremony_id));
    }

    let handles: Vec<_> = prepared
        .into_iter()
        .map(|(response, ceremony_id)| {
            let rp = rp.clone();
            tokio::spawn(async move {
                rp.assertion
                    .complete(&response, &ceremony_id, "alice")
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut regressions = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CeremonyError::CounterRegression { .. }) => regressions += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!((successes, regressions), (1, 1));

    let stored = rp.credentials.credentials_for("alice").await.unwrap();
    assert_eq!(stored[0].signature_counter, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_for_same_user() {
    let rp = Arc::new(TestRelyingParty::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rp = rp.clone();
            tokio::spawn(async move {
                let authenticator = SoftAuthenticator::ed25519().unwrap();
                rp.enroll("alice", &authenticator).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = rp.credentials.credentials_for("alice").await.unwrap();
    assert_eq!(stored.len(), 8);

    let mut ids: Vec<_> = stored.iter().map(|c| c.id.as_bytes().to_vec()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_users_do_not_interfere() {
    let rp = Arc::new(TestRelyingParty::new());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let rp = rp.clone();
            tokio::spawn(async move {
                let username = format!("user{i}");
                let authenticator = SoftAuthenticator::es256().unwrap();
                rp.enroll(&username, &authenticator).await?;
                for counter in 1..=3 {
                    rp.login(&username, &authenticator, counter).await?;
                }
                Ok::<_, CeremonyError>(username)
            })
        })
        .collect();

    for handle in handles {
        let username = handle.await.unwrap().unwrap();
        let stored = rp.credentials.credentials_for(&username).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].signature_counter, 3);
    }
}

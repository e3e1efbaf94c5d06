use std::sync::Arc;

use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::config::RelyingPartyPolicy;
use crate::passkey::errors::CeremonyError;
use crate::passkey::types::{CeremonyId, CeremonyKind, Credential};
use crate::storage::{ChallengeStore, CredentialStore};
use crate::utils::base64url_encode;

use super::challenge::take_ceremony;
use super::types::{
    AssertionOptions, AssertionResponse, AuthenticatorData, ParsedClientData,
    check_credential_envelope,
};
use super::verifier::{RingSignatureVerifier, SignatureVerifier, signed_payload};

/// Issues login options and verifies assertions against enrolled credentials.
///
/// Assertions are always resolved within a named user's credentials;
/// discoverable (usernameless) login is not supported.
pub struct AssertionCeremony {
    policy: RelyingPartyPolicy,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl AssertionCeremony {
    pub fn new(
        policy: RelyingPartyPolicy,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, CeremonyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            challenges,
            credentials,
            verifier: Arc::new(RingSignatureVerifier),
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn policy(&self) -> &RelyingPartyPolicy {
        &self.policy
    }

    /// Options for `username`. An empty `allowCredentials` is not an error;
    /// the client simply finds nothing to sign with.
    pub async fn generate_options(
        &self,
        username: &str,
    ) -> Result<(AssertionOptions, CeremonyId), CeremonyError> {
        let allow_credentials = self
            .credentials
            .credentials_for(username)
            .await?
            .iter()
            .map(Credential::descriptor)
            .collect::<Vec<_>>();

        if allow_credentials.is_empty() {
            tracing::debug!("No credentials enrolled for {}", username);
        }

        let ceremony = self
            .challenges
            .create(CeremonyKind::Assertion, Some(username.to_string()))
            .await?;

        let options = AssertionOptions {
            challenge: ceremony.challenge.clone(),
            timeout: self.policy.timeout_ms,
            rp_id: self.policy.rp_id.clone(),
            allow_credentials,
            user_verification: self.policy.user_verification,
        };

        tracing::debug!(
            "Assertion options for {}: challenge {}",
            username,
            base64url_encode(&options.challenge)
        );

        Ok((options, ceremony.id))
    }

    /// Verifies an assertion for `username` and advances the credential's counter.
    ///
    /// Returns the credential as stored after the update. On
    /// [`CeremonyError::CounterRegression`] nothing is written.
    pub async fn complete(
        &self,
        response: &AssertionResponse,
        ceremony_id: &CeremonyId,
        username: &str,
    ) -> Result<Credential, CeremonyError> {
        let result = self.verify_and_update(response, ceremony_id, username).await;
        match &result {
            Ok(credential) => tracing::info!(
                "Authenticated {} with credential {} (counter {})",
                username,
                credential.id,
                credential.signature_counter
            ),
            Err(e) if e.is_security_alert() => tracing::warn!(
                "Possible cloned authenticator for {}: {}",
                username,
                e
            ),
            Err(e) => tracing::warn!("Assertion ceremony {} failed: {}", ceremony_id, e),
        }
        result
    }

    async fn verify_and_update(
        &self,
        response: &AssertionResponse,
        ceremony_id: &CeremonyId,
        username: &str,
    ) -> Result<Credential, CeremonyError> {
        let ceremony =
            take_ceremony(self.challenges.as_ref(), ceremony_id, CeremonyKind::Assertion).await?;
        if ceremony.username.as_deref() != Some(username) {
            return Err(CeremonyError::InvalidChallenge(
                "Ceremony was issued for a different user".to_string(),
            ));
        }

        check_credential_envelope(&response.type_, &response.id, &response.raw_id)?;

        let mut credential = self
            .credentials
            .find_by_id_for_user(username, &response.raw_id)
            .await?;

        if let Some(user_handle) = &response.response.user_handle {
            let matches = bool::from(
                user_handle
                    .as_slice()
                    .ct_eq(credential.user_handle.as_bytes()),
            );
            if !matches {
                return Err(CeremonyError::UnknownCredential(format!(
                    "User handle does not match credential {}",
                    credential.id
                )));
            }
        }

        let client_data_json = &response.response.client_data_json;
        let client_data = ParsedClientData::from_bytes(client_data_json)?;
        client_data.verify(CeremonyKind::Assertion, &ceremony.challenge, &self.policy)?;

        let auth_data = AuthenticatorData::from_bytes(&response.response.authenticator_data)?;
        auth_data.verify(&self.policy)?;

        let signed_data = signed_payload(&auth_data.raw_data, client_data_json);
        if !self.verifier.verify(
            &credential.public_key,
            &signed_data,
            &response.response.signature,
        ) {
            return Err(CeremonyError::SignatureInvalid);
        }

        let received = auth_data.counter;
        let mut stored = credential.signature_counter;
        if stored == 0 && received == 0 {
            tracing::info!("Credential {} does not use a signature counter", credential.id);
        }

        // Another assertion may advance the counter between our read and the
        // write; re-judge against the value that won and try again.
        loop {
            check_counter(stored, received)?;
            if self
                .credentials
                .compare_and_update_counter(&credential.id, stored, received)
                .await?
            {
                break;
            }
            stored = self
                .credentials
                .find_by_id_for_user(username, &credential.id)
                .await?
                .signature_counter;
            tracing::debug!(
                "Counter of {} moved concurrently to {}, retrying",
                credential.id,
                stored
            );
        }

        credential.signature_counter = received;
        credential.last_used_at = Some(Utc::now());
        Ok(credential)
    }
}

/// Counter rule: when both values are non-zero the new one must be strictly
/// greater. A zero on either side means the authenticator does not count.
pub(crate) fn check_counter(stored: u32, received: u32) -> Result<(), CeremonyError> {
    if stored != 0 && received != 0 && received <= stored {
        return Err(CeremonyError::CounterRegression { stored, received });
    }
    Ok(())
}

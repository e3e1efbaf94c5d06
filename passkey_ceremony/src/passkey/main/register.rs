use std::sync::Arc;

use chrono::Utc;

use crate::config::RelyingPartyPolicy;
use crate::passkey::errors::CeremonyError;
use crate::passkey::types::{
    CeremonyId, CeremonyKind, Credential, CredentialId, User, UserHandle,
};
use crate::storage::{ChallengeStore, CredentialStore};
use crate::utils::base64url_encode;

use super::attestation::{AttestationPolicy, DefaultAttestationPolicy, verify_attestation};
use super::challenge::take_ceremony;
use super::types::{
    AttestationObject, AuthenticatorData, AuthenticatorSelection, CredentialCreationOptions,
    ParsedClientData, PubKeyCredParam, PublicKeyCredentialUserEntity, RegistrationResponse,
    RelyingParty, check_credential_envelope,
};
use super::verifier::{RingSignatureVerifier, SignatureVerifier};

/// Issues credential-creation options and verifies the resulting attestation.
///
/// Each ceremony is `OptionsIssued -> Completed | Failed`; a failed ceremony is
/// not retried, the caller starts a new one.
pub struct RegistrationCeremony {
    policy: RelyingPartyPolicy,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn SignatureVerifier>,
    attestation_policy: Arc<dyn AttestationPolicy>,
}

impl RegistrationCeremony {
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
            attestation_policy: Arc::new(DefaultAttestationPolicy::default()),
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_attestation_policy(mut self, attestation_policy: Arc<dyn AttestationPolicy>) -> Self {
        self.attestation_policy = attestation_policy;
        self
    }

    pub fn policy(&self) -> &RelyingPartyPolicy {
        &self.policy
    }

    /// Builds creation options for `username` and records a pending challenge.
    ///
    /// `excludeCredentials` is the snapshot of the user's enrolled credentials
    /// at call time.
    pub async fn generate_options(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<(CredentialCreationOptions, CeremonyId), CeremonyError> {
        if username.is_empty() {
            return Err(CeremonyError::Malformed(
                "Username must not be empty".to_string(),
            ));
        }

        let user = User::new(username, display_name);

        let exclude_credentials = self
            .credentials
            .credentials_for(username)
            .await?
            .iter()
            .map(Credential::descriptor)
            .collect::<Vec<_>>();

        let ceremony = self
            .challenges
            .create(CeremonyKind::Registration, Some(username.to_string()))
            .await?;

        let options = CredentialCreationOptions {
            challenge: ceremony.challenge.clone(),
            rp: RelyingParty {
                id: self.policy.rp_id.clone(),
                name: self.policy.rp_name.clone(),
            },
            user: PublicKeyCredentialUserEntity {
                id: user.user_handle(),
                name: user.username.clone(),
                display_name: user.display_name.clone(),
            },
            pub_key_cred_params: self
                .policy
                .algorithms
                .iter()
                .map(|alg| PubKeyCredParam {
                    type_: "public-key".to_string(),
                    alg: *alg,
                })
                .collect(),
            timeout: self.policy.timeout_ms,
            exclude_credentials,
            // Discoverable credentials are not used: assertions always name the user.
            authenticator_selection: AuthenticatorSelection {
                resident_key: "discouraged".to_string(),
                require_resident_key: false,
                user_verification: self.policy.user_verification,
            },
            attestation: self.policy.attestation,
        };

        tracing::debug!(
            "Registration options for {}: challenge {}, {} excluded credential(s)",
            username,
            base64url_encode(&options.challenge),
            options.exclude_credentials.len()
        );

        Ok((options, ceremony.id))
    }

    /// Verifies the attestation response and enrolls the new credential.
    ///
    /// The challenge is consumed first; after that every failure leaves the
    /// credential store untouched.
    pub async fn complete(
        &self,
        response: &RegistrationResponse,
        ceremony_id: &CeremonyId,
    ) -> Result<Credential, CeremonyError> {
        let result = self.verify_and_store(response, ceremony_id).await;
        match &result {
            Ok(credential) => tracing::info!(
                "Registered credential {} for {}",
                credential.id,
                credential.owner_username
            ),
            Err(e) => tracing::warn!("Registration ceremony {} failed: {}", ceremony_id, e),
        }
        result
    }

    async fn verify_and_store(
        &self,
        response: &RegistrationResponse,
        ceremony_id: &CeremonyId,
    ) -> Result<Credential, CeremonyError> {
        let ceremony =
            take_ceremony(self.challenges.as_ref(), ceremony_id, CeremonyKind::Registration)
                .await?;
        let username = ceremony.username.clone().ok_or_else(|| {
            CeremonyError::InvalidChallenge("Registration ceremony has no username".to_string())
        })?;

        check_credential_envelope(&response.type_, &response.id, &response.raw_id)?;

        let client_data_json = &response.response.client_data_json;
        let client_data = ParsedClientData::from_bytes(client_data_json)?;
        client_data.verify(CeremonyKind::Registration, &ceremony.challenge, &self.policy)?;

        let attestation = AttestationObject::from_bytes(&response.response.attestation_object)?;
        let auth_data = AuthenticatorData::from_bytes(&attestation.auth_data)?;
        auth_data.verify(&self.policy)?;

        let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
            CeremonyError::Malformed("No attested credential data".to_string())
        })?;

        if attested.credential_id != response.raw_id.as_bytes() {
            return Err(CeremonyError::Malformed(
                "rawId does not match the attested credential id".to_string(),
            ));
        }

        let alg = attested.cose_key.algorithm();
        if !self.policy.accepts_algorithm(alg) {
            return Err(CeremonyError::AttestationRejected(format!(
                "Credential algorithm {alg:?} is not accepted"
            )));
        }

        let verified =
            verify_attestation(&attestation, client_data_json, attested, self.verifier.as_ref())?;
        self.attestation_policy
            .evaluate(&verified)
            .map_err(CeremonyError::AttestationRejected)?;
        tracing::debug!(
            "Attestation {:?} ('{}') accepted, AAGUID {}",
            verified.attestation_type,
            verified.fmt,
            verified.aaguid
        );

        if auth_data.counter == 0 {
            tracing::debug!("Authenticator reports counter 0");
        }

        let credential = Credential {
            id: CredentialId::new(attested.credential_id.clone()),
            public_key: attested.public_key.clone(),
            user_handle: UserHandle::from_username(&username),
            owner_username: username,
            aaguid: verified.aaguid,
            signature_counter: auth_data.counter,
            created_at: Utc::now(),
            last_used_at: None,
        };

        self.credentials.add(credential.clone()).await?;

        Ok(credential)
    }
}

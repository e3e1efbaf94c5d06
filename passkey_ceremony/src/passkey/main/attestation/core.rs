use crate::passkey::errors::CeremonyError;
use crate::utils::sha256;

use super::super::types::{AttestationObject, AttestedCredentialData};
use super::super::verifier::SignatureVerifier;
use super::none::verify_none_attestation;
use super::packed::verify_packed_attestation;
use super::u2f::verify_u2f_attestation;

/// What the attestation statement proved about the new credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationType {
    /// `none`: no provenance claim at all
    None,
    /// Statement signed by the credential key itself
    SelfAttestation,
    /// Statement signed by an attestation certificate (x5c)
    Basic,
}

/// A cryptographically verified attestation statement, handed to the
/// [`AttestationPolicy`] for the accept/reject decision.
#[derive(Clone, Debug)]
pub struct VerifiedAttestation {
    pub fmt: String,
    pub attestation_type: AttestationType,
    /// Hyphenated AAGUID from the attested credential data
    pub aaguid: String,
    /// DER certificates from `x5c`, leaf first; empty unless `Basic`
    pub x5c: Vec<Vec<u8>>,
}

/// Decides whether a verified attestation is acceptable.
///
/// Trust-chain evaluation against vendor roots belongs in an implementation of
/// this trait; none is shipped here.
pub trait AttestationPolicy: Send + Sync + 'static {
    fn evaluate(&self, attestation: &VerifiedAttestation) -> Result<(), String>;
}

/// Accepts `none` and self attestation. Basic attestation is accepted without
/// any chain evaluation only when built with [`DefaultAttestationPolicy::permissive`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAttestationPolicy {
    allow_basic: bool,
}

impl DefaultAttestationPolicy {
    pub fn permissive() -> Self {
        Self { allow_basic: true }
    }
}

impl AttestationPolicy for DefaultAttestationPolicy {
    fn evaluate(&self, attestation: &VerifiedAttestation) -> Result<(), String> {
        match attestation.attestation_type {
            AttestationType::None | AttestationType::SelfAttestation => Ok(()),
            AttestationType::Basic if self.allow_basic => {
                tracing::debug!(
                    "Accepting '{}' basic attestation without chain evaluation",
                    attestation.fmt
                );
                Ok(())
            }
            AttestationType::Basic => Err(format!(
                "Basic attestation ('{}') requires a trust policy",
                attestation.fmt
            )),
        }
    }
}

/// Verify the statement for the format the authenticator declared.
pub(in crate::passkey::main) fn verify_attestation(
    attestation: &AttestationObject,
    client_data_json: &[u8],
    credential: &AttestedCredentialData,
    verifier: &dyn SignatureVerifier,
) -> Result<VerifiedAttestation, CeremonyError> {
    let client_data_hash = sha256(client_data_json);

    let (attestation_type, x5c) = match attestation.fmt.as_str() {
        "none" => {
            // platform authenticators
            tracing::debug!("Using 'none' attestation format");
            verify_none_attestation(&attestation.att_stmt)?;
            (AttestationType::None, Vec::new())
        }
        "packed" => {
            // security keys
            tracing::debug!("Using 'packed' attestation format");
            verify_packed_attestation(
                &attestation.auth_data,
                &client_data_hash,
                &attestation.att_stmt,
                credential,
                verifier,
            )?
        }
        "fido-u2f" => {
            tracing::debug!("Using 'fido-u2f' attestation format");
            let x5c = verify_u2f_attestation(
                &attestation.auth_data,
                &client_data_hash,
                &attestation.att_stmt,
                credential,
            )?;
            (AttestationType::Basic, x5c)
        }
        other => {
            return Err(CeremonyError::AttestationRejected(format!(
                "Unsupported attestation format: {other}"
            )));
        }
    };

    Ok(VerifiedAttestation {
        fmt: attestation.fmt.clone(),
        attestation_type,
        aaguid: credential.aaguid_string(),
        x5c,
    })
}

use ciborium::value::Value as CborValue;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::{AttestationPreference, RelyingPartyPolicy, UserVerification};
use crate::passkey::errors::CeremonyError;
use crate::passkey::types::{CeremonyKind, CredentialDescriptor, CredentialId, UserHandle};
use crate::utils::{base64url_bytes, base64url_bytes_opt, base64url_decode, base64url_encode, sha256};

use super::cose::{CoseAlgorithm, CoseKey};

/// Options for `navigator.credentials.create()`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    #[serde(with = "base64url_bytes")]
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: PublicKeyCredentialUserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u32,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationPreference,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    pub id: UserHandle,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: CoseAlgorithm,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: UserVerification,
}

/// Options for `navigator.credentials.get()`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionOptions {
    #[serde(with = "base64url_bytes")]
    pub challenge: Vec<u8>,
    pub timeout: u32,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerification,
}

/// A `PublicKeyCredential` returned by `navigator.credentials.create()`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: CredentialId,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAttestationResponse,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON", with = "base64url_bytes")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url_bytes")]
    pub attestation_object: Vec<u8>,
}

impl RegistrationResponse {
    /// Build from bytes the transport has already decoded.
    pub fn from_bytes(raw_id: Vec<u8>, client_data_json: Vec<u8>, attestation_object: Vec<u8>) -> Self {
        Self {
            id: base64url_encode(&raw_id),
            raw_id: CredentialId::new(raw_id),
            type_: "public-key".to_string(),
            response: AuthenticatorAttestationResponse {
                client_data_json,
                attestation_object,
            },
        }
    }
}

/// A `PublicKeyCredential` returned by `navigator.credentials.get()`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    pub id: String,
    pub raw_id: CredentialId,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAssertionResponse,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON", with = "base64url_bytes")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url_bytes")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url_bytes")]
    pub signature: Vec<u8>,
    #[serde(default, with = "base64url_bytes_opt")]
    pub user_handle: Option<Vec<u8>>,
}

impl AssertionResponse {
    pub fn from_bytes(
        raw_id: Vec<u8>,
        client_data_json: Vec<u8>,
        authenticator_data: Vec<u8>,
        signature: Vec<u8>,
        user_handle: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: base64url_encode(&raw_id),
            raw_id: CredentialId::new(raw_id),
            type_: "public-key".to_string(),
            response: AuthenticatorAssertionResponse {
                client_data_json,
                authenticator_data,
                signature,
                user_handle,
            },
        }
    }
}

/// Checks the envelope every response shares: `type` and `id` agreeing with `rawId`.
pub(super) fn check_credential_envelope(
    type_: &str,
    id: &str,
    raw_id: &CredentialId,
) -> Result<(), CeremonyError> {
    if type_ != "public-key" {
        return Err(CeremonyError::Malformed(format!(
            "Unexpected credential type: {type_}"
        )));
    }
    if id != raw_id.to_base64url() {
        return Err(CeremonyError::Malformed(
            "Credential id does not match rawId".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub(super) struct ParsedClientData {
    pub(super) type_: String,
    pub(super) challenge: String,
    pub(super) origin: String,
}

impl ParsedClientData {
    pub(super) fn from_bytes(raw: &[u8]) -> Result<Self, CeremonyError> {
        let data_str = std::str::from_utf8(raw)
            .map_err(|e| CeremonyError::Malformed(format!("Invalid UTF-8 in client data: {e}")))?;

        let data: serde_json::Value = serde_json::from_str(data_str)
            .map_err(|e| CeremonyError::Malformed(format!("Invalid client data JSON: {e}")))?;

        let field = |name: &str| {
            data[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| CeremonyError::Malformed(format!("Client data missing {name}")))
        };

        Ok(Self {
            type_: field("type")?,
            challenge: field("challenge")?,
            origin: field("origin")?,
        })
    }

    /// Type and challenge first, then origin.
    pub(super) fn verify(
        &self,
        kind: CeremonyKind,
        expected_challenge: &[u8],
        policy: &RelyingPartyPolicy,
    ) -> Result<(), CeremonyError> {
        let expected_type = kind.client_data_type();
        if self.type_ != expected_type {
            return Err(CeremonyError::ChallengeMismatch(format!(
                "Invalid type. Expected '{}', got '{}'",
                expected_type, self.type_
            )));
        }

        let received = base64url_decode(&self.challenge).map_err(|_| {
            CeremonyError::ChallengeMismatch("Challenge is not valid base64url".to_string())
        })?;
        let same = received.len() == expected_challenge.len()
            && bool::from(received.as_slice().ct_eq(expected_challenge));
        if !same {
            tracing::debug!(
                "Challenge mismatch. Expected: {}, got: {}",
                base64url_encode(expected_challenge),
                self.challenge
            );
            return Err(CeremonyError::ChallengeMismatch(
                "Challenge does not match the issued challenge".to_string(),
            ));
        }

        if !policy.accepts_origin(&self.origin) {
            return Err(CeremonyError::OriginMismatch {
                expected: policy.origins.clone(),
                got: self.origin.clone(),
            });
        }

        Ok(())
    }
}

/// Flags for AuthenticatorData as defined in WebAuthn Level 2
mod auth_data_flags {
    pub(super) const UP: u8 = 1 << 0;
    pub(super) const UV: u8 = 1 << 2;
    pub(super) const BE: u8 = 1 << 3;
    pub(super) const BS: u8 = 1 << 4;
    pub(super) const AT: u8 = 1 << 6;
    pub(super) const ED: u8 = 1 << 7;
}

const RP_ID_HASH_LEN: usize = 32;
const AUTH_DATA_MIN_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

#[derive(Debug, Clone)]
pub(super) struct AttestedCredentialData {
    pub(super) aaguid: [u8; AAGUID_LEN],
    pub(super) credential_id: Vec<u8>,
    /// COSE_Key bytes as they appear in authenticator data
    pub(super) public_key: Vec<u8>,
    pub(super) cose_key: CoseKey,
}

impl AttestedCredentialData {
    pub(super) fn aaguid_string(&self) -> String {
        Uuid::from_bytes(self.aaguid).hyphenated().to_string()
    }
}

/// Authenticator data:
/// rpIdHash (32) | flags (1) | signCount (4, big-endian) | attested credential data? | extensions?
#[derive(Debug)]
pub(super) struct AuthenticatorData {
    pub(super) rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub(super) flags: u8,
    pub(super) counter: u32,
    pub(super) attested_credential: Option<AttestedCredentialData>,
    pub(super) raw_data: Vec<u8>,
}

impl AuthenticatorData {
    pub(super) fn from_bytes(data: &[u8]) -> Result<Self, CeremonyError> {
        if data.len() < AUTH_DATA_MIN_LEN {
            return Err(CeremonyError::Malformed(format!(
                "Authenticator data too short: {} bytes",
                data.len()
            )));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&data[..RP_ID_HASH_LEN]);
        let flags = data[32];
        let counter = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let attested_credential = if flags & auth_data_flags::AT != 0 {
            Some(parse_attested_credential(&data[AUTH_DATA_MIN_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested_credential,
            raw_data: data.to_vec(),
        })
    }

    pub(super) fn is_user_present(&self) -> bool {
        (self.flags & auth_data_flags::UP) != 0
    }

    pub(super) fn is_user_verified(&self) -> bool {
        (self.flags & auth_data_flags::UV) != 0
    }

    pub(super) fn is_backup_eligible(&self) -> bool {
        (self.flags & auth_data_flags::BE) != 0
    }

    pub(super) fn is_backed_up(&self) -> bool {
        (self.flags & auth_data_flags::BS) != 0
    }

    pub(super) fn has_extension_data(&self) -> bool {
        (self.flags & auth_data_flags::ED) != 0
    }

    /// rpIdHash, then the UP and UV flags the policy asks for.
    pub(super) fn verify(&self, policy: &RelyingPartyPolicy) -> Result<(), CeremonyError> {
        let expected_hash = sha256(policy.rp_id.as_bytes());
        if !bool::from(self.rp_id_hash[..].ct_eq(&expected_hash[..])) {
            return Err(CeremonyError::RpIdMismatch(format!(
                "rpIdHash does not match SHA-256 of '{}'",
                policy.rp_id
            )));
        }

        if !self.is_user_present() {
            return Err(CeremonyError::UserPresence(
                "User Present flag not set".to_string(),
            ));
        }

        if policy.user_verification == UserVerification::Required && !self.is_user_verified() {
            return Err(CeremonyError::UserPresence(format!(
                "User verification required but flag not set. Flags: {:02x}",
                self.flags
            )));
        }

        tracing::debug!(
            "Authenticator flags - UP: {}, UV: {}, BE: {}, BS: {}, ED: {}, counter: {}",
            self.is_user_present(),
            self.is_user_verified(),
            self.is_backup_eligible(),
            self.is_backed_up(),
            self.has_extension_data(),
            self.counter
        );

        Ok(())
    }
}

fn parse_attested_credential(data: &[u8]) -> Result<AttestedCredentialData, CeremonyError> {
    if data.len() < AAGUID_LEN + 2 {
        return Err(CeremonyError::Malformed(
            "Attested credential data too short".to_string(),
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&data[..AAGUID_LEN]);

    let id_len = u16::from_be_bytes([data[AAGUID_LEN], data[AAGUID_LEN + 1]]) as usize;
    let id_start = AAGUID_LEN + 2;
    let id_end = id_start + id_len;
    if id_len == 0 || data.len() <= id_end {
        return Err(CeremonyError::Malformed(
            "Invalid credential id length".to_string(),
        ));
    }
    let credential_id = data[id_start..id_end].to_vec();

    // The COSE key is followed by optional extension data; measure what the decoder consumed.
    let key_region = &data[id_end..];
    let mut cursor: &[u8] = key_region;
    let key_value: CborValue = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| CeremonyError::Malformed(format!("Invalid public key CBOR: {e}")))?;
    let consumed = key_region.len() - cursor.len();
    let cose_key = CoseKey::from_cbor(&key_value)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key: key_region[..consumed].to_vec(),
        cose_key,
    })
}

#[derive(Debug)]
pub(super) struct AttestationObject {
    pub(super) fmt: String,
    pub(super) auth_data: Vec<u8>,
    pub(super) att_stmt: Vec<(CborValue, CborValue)>,
}

impl AttestationObject {
    pub(super) fn from_bytes(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| CeremonyError::Malformed(format!("Invalid attestation object CBOR: {e}")))?;

        let CborValue::Map(entries) = value else {
            return Err(CeremonyError::Malformed(
                "Attestation object is not a CBOR map".to_string(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        let mut att_stmt = None;

        for (k, v) in entries {
            match (k, v) {
                (CborValue::Text(k), CborValue::Text(v)) if k == "fmt" => fmt = Some(v),
                (CborValue::Text(k), CborValue::Bytes(v)) if k == "authData" => auth_data = Some(v),
                (CborValue::Text(k), CborValue::Map(v)) if k == "attStmt" => att_stmt = Some(v),
                _ => {}
            }
        }

        match (fmt, auth_data, att_stmt) {
            (Some(fmt), Some(auth_data), Some(att_stmt)) => {
                tracing::debug!("Attestation format: {}", fmt);
                Ok(Self {
                    fmt,
                    auth_data,
                    att_stmt,
                })
            }
            _ => Err(CeremonyError::Malformed(
                "Attestation object missing fmt, authData or attStmt".to_string(),
            )),
        }
    }
}

//! A software authenticator that answers ceremonies with real signatures.
//!
//! Available under `cfg(test)` and with the `testing` feature, for integration
//! tests and the demo binary.

use std::sync::Mutex;

use ciborium::value::{Integer, Value as CborValue};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_P384_SHA384_ASN1_SIGNING, EcdsaKeyPair,
    EcdsaSigningAlgorithm, Ed25519KeyPair, KeyPair,
};
use uuid::Uuid;

use crate::passkey::{
    AssertionOptions, AssertionResponse, CeremonyError, CoseAlgorithm, CoseKey,
    CredentialCreationOptions, RegistrationResponse, signed_payload,
};
use crate::utils::{base64url_encode, gen_random_bytes, sha256};

const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_AT: u8 = 0x40;

enum SoftKey {
    Ecdsa(EcdsaKeyPair, CoseAlgorithm),
    Ed25519(Ed25519KeyPair),
}

/// Holds one credential key pair and produces attestation objects and
/// assertions the way a platform authenticator would.
pub struct SoftAuthenticator {
    key: SoftKey,
    credential_id: Vec<u8>,
    self_attestation: bool,
    user_verification: bool,
    user_handle: Mutex<Option<Vec<u8>>>,
    rng: SystemRandom,
}

impl SoftAuthenticator {
    /// AAGUID reported in attested credential data.
    pub const AAGUID: &'static str = "6f1c9b2e-4a73-4d58-9e21-0c5a7b3d8f40";

    pub fn es256() -> Result<Self, CeremonyError> {
        Self::ecdsa(&ECDSA_P256_SHA256_ASN1_SIGNING, CoseAlgorithm::ES256)
    }

    pub fn es384() -> Result<Self, CeremonyError> {
        Self::ecdsa(&ECDSA_P384_SHA384_ASN1_SIGNING, CoseAlgorithm::ES384)
    }

    pub fn ed25519() -> Result<Self, CeremonyError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| CeremonyError::Crypto("Failed to generate Ed25519 key".to_string()))?;
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| CeremonyError::Crypto(format!("Failed to load Ed25519 key: {e}")))?;
        Self::with_key(SoftKey::Ed25519(pair), rng)
    }

    fn ecdsa(
        alg: &'static EcdsaSigningAlgorithm,
        cose_alg: CoseAlgorithm,
    ) -> Result<Self, CeremonyError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng)
            .map_err(|_| CeremonyError::Crypto("Failed to generate ECDSA key".to_string()))?;
        let pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng)
            .map_err(|e| CeremonyError::Crypto(format!("Failed to load ECDSA key: {e}")))?;
        Self::with_key(SoftKey::Ecdsa(pair, cose_alg), rng)
    }

    fn with_key(key: SoftKey, rng: SystemRandom) -> Result<Self, CeremonyError> {
        Ok(Self {
            key,
            credential_id: gen_random_bytes(32)?,
            self_attestation: false,
            user_verification: true,
            user_handle: Mutex::new(None),
            rng,
        })
    }

    /// Attest with a `packed` self-attestation statement instead of `none`.
    pub fn with_self_attestation(mut self) -> Self {
        self.self_attestation = true;
        self
    }

    /// Leave the UV flag clear in authenticator data.
    pub fn without_user_verification(mut self) -> Self {
        self.user_verification = false;
        self
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn algorithm(&self) -> CoseAlgorithm {
        match &self.key {
            SoftKey::Ecdsa(_, alg) => *alg,
            SoftKey::Ed25519(_) => CoseAlgorithm::EdDSA,
        }
    }

    pub fn cose_key(&self) -> CoseKey {
        match &self.key {
            SoftKey::Ecdsa(pair, alg) => {
                // SEC1 uncompressed point: 0x04 || x || y
                let point = pair.public_key().as_ref();
                let half = (point.len() - 1) / 2;
                CoseKey::Ec2 {
                    alg: *alg,
                    x: point[1..1 + half].to_vec(),
                    y: point[1 + half..].to_vec(),
                }
            }
            SoftKey::Ed25519(pair) => CoseKey::Okp {
                alg: CoseAlgorithm::EdDSA,
                x: pair.public_key().as_ref().to_vec(),
            },
        }
    }

    /// clientDataJSON as a browser would serialize it.
    pub fn client_data(type_: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::json!({
            "type": type_,
            "challenge": base64url_encode(challenge),
            "origin": origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    pub fn register(
        &self,
        options: &CredentialCreationOptions,
        origin: &str,
    ) -> Result<RegistrationResponse, CeremonyError> {
        let client_data = Self::client_data("webauthn.create", &options.challenge, origin);
        self.register_with_client_data(options, client_data)
    }

    /// Answer a registration with caller-supplied clientDataJSON.
    pub fn register_with_client_data(
        &self,
        options: &CredentialCreationOptions,
        client_data_json: Vec<u8>,
    ) -> Result<RegistrationResponse, CeremonyError> {
        let mut auth_data = self.auth_data_prefix(&options.rp.id, FLAG_AT, 0);
        let aaguid = Uuid::parse_str(Self::AAGUID)
            .map_err(|e| CeremonyError::Malformed(format!("AAGUID: {e}")))?;
        auth_data.extend_from_slice(aaguid.as_bytes());
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key().to_bytes()?);

        let (fmt, att_stmt) = if self.self_attestation {
            let sig = self.sign(&signed_payload(&auth_data, &client_data_json))?;
            (
                "packed",
                vec![
                    (
                        CborValue::Text("alg".to_string()),
                        CborValue::Integer(Integer::from(self.algorithm().id())),
                    ),
                    (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
                ],
            )
        } else {
            ("none", Vec::new())
        };

        let attestation_object = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text(fmt.to_string()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                CborValue::Map(att_stmt),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data),
            ),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&attestation_object, &mut encoded)
            .map_err(|e| CeremonyError::Malformed(format!("Attestation object: {e}")))?;

        if let Ok(mut handle) = self.user_handle.lock() {
            *handle = Some(options.user.id.as_bytes().to_vec());
        }

        Ok(RegistrationResponse::from_bytes(
            self.credential_id.clone(),
            client_data_json,
            encoded,
        ))
    }

    pub fn assert(
        &self,
        options: &AssertionOptions,
        origin: &str,
        counter: u32,
    ) -> Result<AssertionResponse, CeremonyError> {
        let client_data = Self::client_data("webauthn.get", &options.challenge, origin);
        self.assert_with_client_data(options, counter, client_data)
    }

    /// Answer an assertion with caller-supplied clientDataJSON.
    pub fn assert_with_client_data(
        &self,
        options: &AssertionOptions,
        counter: u32,
        client_data_json: Vec<u8>,
    ) -> Result<AssertionResponse, CeremonyError> {
        let auth_data = self.auth_data_prefix(&options.rp_id, 0, counter);
        let signature = self.sign(&signed_payload(&auth_data, &client_data_json))?;
        let user_handle = self.user_handle.lock().ok().and_then(|h| h.clone());

        Ok(AssertionResponse::from_bytes(
            self.credential_id.clone(),
            client_data_json,
            auth_data,
            signature,
            user_handle,
        ))
    }

    fn auth_data_prefix(&self, rp_id: &str, extra_flags: u8, counter: u32) -> Vec<u8> {
        let mut flags = FLAG_UP | extra_flags;
        if self.user_verification {
            flags |= FLAG_UV;
        }
        let mut data = sha256(rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CeremonyError> {
        match &self.key {
            SoftKey::Ecdsa(pair, _) => pair
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| CeremonyError::Crypto("ECDSA signing failed".to_string())),
            SoftKey::Ed25519(pair) => Ok(pair.sign(message).as_ref().to_vec()),
        }
    }
}

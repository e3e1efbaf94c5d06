use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use crate::utils::sha256;

use super::cose::{CoseAlgorithm, CoseKey};

/// Checks a signature against COSE-encoded public key material.
///
/// Implementations are stateless; the algorithm is taken from the key itself.
pub trait SignatureVerifier: Send + Sync + 'static {
    fn verify(&self, public_key: &[u8], signed_data: &[u8], signature: &[u8]) -> bool;
}

/// [`SignatureVerifier`] backed by `ring`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RingSignatureVerifier;

impl SignatureVerifier for RingSignatureVerifier {
    fn verify(&self, public_key: &[u8], signed_data: &[u8], signature: &[u8]) -> bool {
        match CoseKey::from_bytes(public_key) {
            Ok(key) => verify_with_key(&key, signed_data, signature),
            Err(e) => {
                tracing::debug!("Cannot decode stored public key: {}", e);
                false
            }
        }
    }
}

/// The bytes an authenticator signs: `authenticatorData || SHA-256(clientDataJSON)`.
pub fn signed_payload(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_data_hash = sha256(client_data_json);
    let mut signed_data = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(auth_data);
    signed_data.extend_from_slice(&client_data_hash);
    signed_data
}

fn verify_with_key(key: &CoseKey, signed_data: &[u8], signature: &[u8]) -> bool {
    let result = match key {
        CoseKey::Ec2 { alg, .. } => {
            let algorithm = match alg {
                CoseAlgorithm::ES384 => &signature::ECDSA_P384_SHA384_ASN1,
                _ => &signature::ECDSA_P256_SHA256_ASN1,
            };
            match key.uncompressed_point() {
                Some(point) => {
                    UnparsedPublicKey::new(algorithm, &point).verify(signed_data, signature)
                }
                None => return false,
            }
        }
        CoseKey::Okp { x, .. } => {
            UnparsedPublicKey::new(&signature::ED25519, x).verify(signed_data, signature)
        }
        CoseKey::Rsa { n, e, .. } => {
            let components = RsaPublicKeyComponents {
                n: strip_leading_zeros(n),
                e: strip_leading_zeros(e),
            };
            components.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                signed_data,
                signature,
            )
        }
    };

    match result {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!(
                "Signature verification failed for {:?} key",
                key.algorithm()
            );
            false
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}

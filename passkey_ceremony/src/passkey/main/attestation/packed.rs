use ciborium::value::Value as CborValue;

use crate::passkey::errors::CeremonyError;

use super::super::types::AttestedCredentialData;
use super::super::verifier::SignatureVerifier;
use super::core::AttestationType;
use super::utils::{
    get_alg_from_stmt, get_sig_from_stmt, get_x5c_from_stmt, has_stmt_entry, rejected,
    verify_attestation_cert, verify_with_cert,
};

/// Verifies a packed attestation statement.
///
/// With `x5c` the signature is checked against the leaf certificate (basic
/// attestation); without it the credential key must have signed the statement
/// (self attestation). ECDAA is not supported.
pub(super) fn verify_packed_attestation(
    auth_data: &[u8],
    client_data_hash: &[u8],
    att_stmt: &[(CborValue, CborValue)],
    credential: &AttestedCredentialData,
    verifier: &dyn SignatureVerifier,
) -> Result<(AttestationType, Vec<Vec<u8>>), CeremonyError> {
    let alg = get_alg_from_stmt(att_stmt)?;
    let sig = get_sig_from_stmt(att_stmt)?;

    let mut signed_data = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(auth_data);
    signed_data.extend_from_slice(client_data_hash);

    if has_stmt_entry(att_stmt, "ecdaaKeyId") {
        return Err(rejected("ECDAA attestation not supported"));
    }

    match get_x5c_from_stmt(att_stmt)? {
        Some(x5c) => {
            tracing::debug!("Packed basic attestation with {} certificate(s)", x5c.len());
            let leaf = &x5c[0];
            verify_attestation_cert(leaf, &credential.aaguid)?;
            verify_with_cert(leaf, alg, &signed_data, &sig)?;
            Ok((AttestationType::Basic, x5c))
        }
        None => {
            tracing::debug!("Packed self attestation");
            if alg != credential.cose_key.algorithm() {
                return Err(rejected(format!(
                    "Self attestation algorithm {:?} differs from credential key {:?}",
                    alg,
                    credential.cose_key.algorithm()
                )));
            }
            if !verifier.verify(&credential.public_key, &signed_data, &sig) {
                return Err(rejected("Self attestation signature verification failed"));
            }
            Ok((AttestationType::SelfAttestation, Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passkey::main::cose::{CoseAlgorithm, CoseKey};
    use crate::passkey::main::verifier::RingSignatureVerifier;
    use crate::utils::sha256;
    use ciborium::value::Integer;
    use ring::rand::SystemRandom;
    use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

    struct Fixture {
        pair: EcdsaKeyPair,
        credential: AttestedCredentialData,
        auth_data: Vec<u8>,
        client_data_hash: [u8; 32],
    }

    fn fixture() -> Fixture {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();
        let point = pair.public_key().as_ref().to_vec();
        let cose_key = CoseKey::Ec2 {
            alg: CoseAlgorithm::ES256,
            x: point[1..33].to_vec(),
            y: point[33..65].to_vec(),
        };
        let public_key = cose_key.to_bytes().unwrap();

        let mut auth_data = sha256(b"example.com").to_vec();
        auth_data.push(0x41);
        auth_data.extend_from_slice(&0u32.to_be_bytes());
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&4u16.to_be_bytes());
        auth_data.extend_from_slice(&[1, 2, 3, 4]);
        auth_data.extend_from_slice(&public_key);

        Fixture {
            pair,
            credential: AttestedCredentialData {
                aaguid: [0u8; 16],
                credential_id: vec![1, 2, 3, 4],
                public_key,
                cose_key,
            },
            auth_data,
            client_data_hash: sha256(b"{\"type\":\"webauthn.create\"}"),
        }
    }

    fn stmt(alg: i64, sig: Vec<u8>) -> Vec<(CborValue, CborValue)> {
        vec![
            (
                CborValue::Text("alg".to_string()),
                CborValue::Integer(Integer::from(alg)),
            ),
            (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
        ]
    }

    fn sign(f: &Fixture) -> Vec<u8> {
        let mut signed = f.auth_data.clone();
        signed.extend_from_slice(&f.client_data_hash);
        f.pair
            .sign(&SystemRandom::new(), &signed)
            .unwrap()
            .as_ref()
            .to_vec()
    }

    #[test]
    fn test_self_attestation_verifies() {
        // Given a statement signed by the credential key
        let f = fixture();
        let att_stmt = stmt(-7, sign(&f));

        // When verifying
        let (kind, x5c) =
            verify_packed_attestation(&f.auth_data, &f.client_data_hash, &att_stmt, &f.credential, &RingSignatureVerifier)
                .unwrap();

        // Then it is self attestation with no chain
        assert_eq!(kind, AttestationType::SelfAttestation);
        assert!(x5c.is_empty());
    }

    #[test]
    fn test_self_attestation_bad_signature() {
        let f = fixture();
        let mut sig = sign(&f);
        let last = sig.len() - 1;
        sig[last] ^= 0xff;
        let result = verify_packed_attestation(
            &f.auth_data,
            &f.client_data_hash,
            &stmt(-7, sig),
            &f.credential,
            &RingSignatureVerifier,
        );
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_self_attestation_algorithm_must_match_key() {
        let f = fixture();
        let result = verify_packed_attestation(
            &f.auth_data,
            &f.client_data_hash,
            &stmt(-8, sign(&f)),
            &f.credential,
            &RingSignatureVerifier,
        );
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_ecdaa_rejected() {
        let f = fixture();
        let mut att_stmt = stmt(-7, sign(&f));
        att_stmt.push((
            CborValue::Text("ecdaaKeyId".to_string()),
            CborValue::Bytes(vec![1]),
        ));
        let result =
            verify_packed_attestation(&f.auth_data, &f.client_data_hash, &att_stmt, &f.credential, &RingSignatureVerifier);
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }

    #[test]
    fn test_unparseable_x5c_rejected() {
        let f = fixture();
        let mut att_stmt = stmt(-7, sign(&f));
        att_stmt.push((
            CborValue::Text("x5c".to_string()),
            CborValue::Array(vec![CborValue::Bytes(vec![0x30, 0x00])]),
        ));
        let result =
            verify_packed_attestation(&f.auth_data, &f.client_data_hash, &att_stmt, &f.credential, &RingSignatureVerifier);
        assert!(matches!(result, Err(CeremonyError::AttestationRejected(_))));
    }
}

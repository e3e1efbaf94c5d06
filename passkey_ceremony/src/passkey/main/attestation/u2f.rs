use ciborium::value::Value as CborValue;

use crate::passkey::errors::CeremonyError;

use super::super::cose::CoseAlgorithm;
use super::super::types::AttestedCredentialData;
use super::utils::{
    get_sig_from_stmt, get_x5c_from_stmt, rejected, verify_attestation_cert, verify_with_cert,
};

/// Verifies a FIDO-U2F attestation statement and returns its certificate chain.
///
/// The leaf certificate signs the U2F registration payload:
/// `0x00 || rpIdHash || clientDataHash || credentialId || 0x04 || x || y`.
pub(super) fn verify_u2f_attestation(
    auth_data: &[u8],
    client_data_hash: &[u8],
    att_stmt: &[(CborValue, CborValue)],
    credential: &AttestedCredentialData,
) -> Result<Vec<Vec<u8>>, CeremonyError> {
    let sig = get_sig_from_stmt(att_stmt)?;
    let x5c = get_x5c_from_stmt(att_stmt)?
        .ok_or_else(|| rejected("Missing x5c in FIDO-U2F attestation"))?;

    if x5c.len() != 1 {
        return Err(rejected(format!(
            "FIDO-U2F attestation expects exactly one certificate, got {}",
            x5c.len()
        )));
    }

    // U2F devices only hold P-256 keys
    if credential.cose_key.algorithm() != CoseAlgorithm::ES256 {
        return Err(rejected("FIDO-U2F credential key must be ES256"));
    }
    let point = credential
        .cose_key
        .uncompressed_point()
        .ok_or_else(|| rejected("FIDO-U2F credential key is not an EC2 key"))?;

    if auth_data.len() < 32 {
        return Err(rejected("auth_data too short for FIDO-U2F verification"));
    }

    let mut verification_data = Vec::with_capacity(
        1 + 32 + client_data_hash.len() + credential.credential_id.len() + point.len(),
    );
    verification_data.push(0x00);
    verification_data.extend_from_slice(&auth_data[..32]);
    verification_data.extend_from_slice(client_data_hash);
    verification_data.extend_from_slice(&credential.credential_id);
    verification_data.extend_from_slice(&point);

    verify_attestation_cert(&x5c[0], &credential.aaguid)?;
    verify_with_cert(&x5c[0], CoseAlgorithm::ES256, &verification_data, &sig)?;

    tracing::debug!("FIDO-U2F attestation verification successful");
    Ok(x5c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passkey::main::cose::CoseKey;

    fn credential(key: CoseKey) -> AttestedCredentialData {
        AttestedCredentialData {
            aaguid: [0u8; 16],
            credential_id: vec![7; 16],
            public_key: key.to_bytes().unwrap(),
            cose_key: key,
        }
    }

    fn es256() -> CoseKey {
        CoseKey::Ec2 {
            alg: CoseAlgorithm::ES256,
            x: vec![1; 32],
            y: vec![2; 32],
        }
    }

    fn entry(name: &str, value: CborValue) -> (CborValue, CborValue) {
        (CborValue::Text(name.to_string()), value)
    }

    #[test]
    fn test_missing_sig_or_x5c() {
        let cred = credential(es256());
        let no_sig = vec![entry(
            "x5c",
            CborValue::Array(vec![CborValue::Bytes(vec![0x30])]),
        )];
        assert!(verify_u2f_attestation(&[0; 37], &[0; 32], &no_sig, &cred).is_err());

        let no_x5c = vec![entry("sig", CborValue::Bytes(vec![1]))];
        assert!(matches!(
            verify_u2f_attestation(&[0; 37], &[0; 32], &no_x5c, &cred),
            Err(CeremonyError::AttestationRejected(_))
        ));
    }

    #[test]
    fn test_non_p256_credential_rejected() {
        let cred = credential(CoseKey::Okp {
            alg: CoseAlgorithm::EdDSA,
            x: vec![3; 32],
        });
        let stmt = vec![
            entry("sig", CborValue::Bytes(vec![1])),
            entry("x5c", CborValue::Array(vec![CborValue::Bytes(vec![0x30])])),
        ];
        assert!(matches!(
            verify_u2f_attestation(&[0; 37], &[0; 32], &stmt, &cred),
            Err(CeremonyError::AttestationRejected(_))
        ));
    }

    #[test]
    fn test_invalid_certificate_rejected() {
        let stmt = vec![
            entry("sig", CborValue::Bytes(vec![1])),
            entry(
                "x5c",
                CborValue::Array(vec![CborValue::Bytes(vec![0x30, 0x01, 0x00])]),
            ),
        ];
        assert!(matches!(
            verify_u2f_attestation(&[0; 37], &[0; 32], &stmt, &credential(es256())),
            Err(CeremonyError::AttestationRejected(_))
        ));
    }

    #[test]
    fn test_chain_longer_than_one_rejected() {
        let stmt = vec![
            entry("sig", CborValue::Bytes(vec![1])),
            entry(
                "x5c",
                CborValue::Array(vec![
                    CborValue::Bytes(vec![0x30]),
                    CborValue::Bytes(vec![0x30]),
                ]),
            ),
        ];
        assert!(verify_u2f_attestation(&[0; 37], &[0; 32], &stmt, &credential(es256())).is_err());
    }
}

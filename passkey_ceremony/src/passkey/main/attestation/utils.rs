use ciborium::value::Value as CborValue;
use x509_parser::{certificate::X509Certificate, prelude::*};

use crate::passkey::errors::CeremonyError;

use super::super::cose::{CoseAlgorithm, cbor_to_i64};

// id-fido-gen-ce-aaguid
const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";

pub(super) fn rejected(msg: impl Into<String>) -> CeremonyError {
    CeremonyError::AttestationRejected(msg.into())
}

fn stmt_entry<'a>(att_stmt: &'a [(CborValue, CborValue)], name: &str) -> Option<&'a CborValue> {
    att_stmt
        .iter()
        .find(|(k, _)| matches!(k, CborValue::Text(t) if t == name))
        .map(|(_, v)| v)
}

pub(super) fn get_sig_from_stmt(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<Vec<u8>, CeremonyError> {
    match stmt_entry(att_stmt, "sig") {
        Some(CborValue::Bytes(sig)) => Ok(sig.clone()),
        _ => Err(rejected("Missing signature in attestation statement")),
    }
}

pub(super) fn get_alg_from_stmt(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<CoseAlgorithm, CeremonyError> {
    let id = stmt_entry(att_stmt, "alg")
        .and_then(cbor_to_i64)
        .ok_or_else(|| rejected("Missing algorithm in attestation statement"))?;
    CoseAlgorithm::from_id(id)
        .ok_or_else(|| rejected(format!("Unsupported attestation algorithm: {id}")))
}

/// The `x5c` chain, leaf first. `None` when the statement carries no chain.
pub(super) fn get_x5c_from_stmt(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<Option<Vec<Vec<u8>>>, CeremonyError> {
    let Some(value) = stmt_entry(att_stmt, "x5c") else {
        return Ok(None);
    };
    let CborValue::Array(certs) = value else {
        return Err(rejected("x5c is not an array"));
    };

    let chain = certs
        .iter()
        .map(|cert| match cert {
            CborValue::Bytes(der) => Ok(der.clone()),
            _ => Err(rejected("x5c entry is not a byte string")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if chain.is_empty() {
        return Err(rejected("Empty x5c in attestation statement"));
    }
    Ok(Some(chain))
}

pub(super) fn has_stmt_entry(att_stmt: &[(CborValue, CborValue)], name: &str) -> bool {
    stmt_entry(att_stmt, name).is_some()
}

/// Attestation certificate profile: currently valid, not a CA, and when it
/// carries the FIDO AAGUID extension that value must equal the authenticator's.
pub(super) fn verify_attestation_cert(
    cert_der: &[u8],
    aaguid: &[u8; 16],
) -> Result<(), CeremonyError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| rejected(format!("Failed to parse X509 certificate: {e}")))?;

    if !cert.validity().is_valid() {
        return Err(rejected("Attestation certificate is expired or not yet valid"));
    }

    for ext in cert.extensions() {
        if ext.oid.as_bytes() == oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS.as_bytes() {
            if let ParsedExtension::BasicConstraints(bc) = ext.parsed_extension() {
                if bc.ca {
                    return Err(rejected("Attestation certificate must not be a CA"));
                }
            }
        } else if ext.oid.to_id_string() == OID_FIDO_GEN_CE_AAGUID {
            // OCTET STRING, length 16
            let value = ext.value;
            if value.len() != 18 || value[0] != 0x04 || value[1] != 0x10 {
                return Err(rejected("Malformed AAGUID certificate extension"));
            }
            if &value[2..] != aaguid.as_slice() {
                return Err(rejected(
                    "AAGUID mismatch between certificate and authenticator data",
                ));
            }
        }
    }

    Ok(())
}

pub(super) fn webpki_algorithm(
    alg: CoseAlgorithm,
) -> &'static webpki::SignatureAlgorithm {
    match alg {
        CoseAlgorithm::ES256 => &webpki::ECDSA_P256_SHA256,
        CoseAlgorithm::ES384 => &webpki::ECDSA_P384_SHA384,
        CoseAlgorithm::EdDSA => &webpki::ED25519,
        CoseAlgorithm::RS256 => &webpki::RSA_PKCS1_2048_8192_SHA256,
    }
}

/// Verify `signature` over `signed_data` with the leaf certificate's public key.
pub(super) fn verify_with_cert(
    cert_der: &[u8],
    alg: CoseAlgorithm,
    signed_data: &[u8],
    signature: &[u8],
) -> Result<(), CeremonyError> {
    let cert = webpki::EndEntityCert::try_from(cert_der)
        .map_err(|e| rejected(format!("Failed to parse attestation certificate: {e:?}")))?;
    cert.verify_signature(webpki_algorithm(alg), signed_data, signature)
        .map_err(|_| rejected("Attestation signature invalid"))
}

//! COSE_Key decoding (RFC 9053) for the key types WebAuthn authenticators emit.

use ciborium::value::{Integer, Value as CborValue};
use serde::{Deserialize, Serialize};

use crate::passkey::errors::CeremonyError;

// COSE_Key common parameters
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
// EC2 / OKP parameters
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
// RSA parameters
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_P384: i64 = 2;
const CRV_ED25519: i64 = 6;

/// Public-key algorithms this relying party can verify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA w/ SHA-256 on P-256
    ES256,
    /// Ed25519
    EdDSA,
    /// ECDSA w/ SHA-384 on P-384
    ES384,
    /// RSASSA-PKCS1-v1_5 w/ SHA-256
    RS256,
}

impl CoseAlgorithm {
    pub fn id(self) -> i64 {
        match self {
            CoseAlgorithm::ES256 => -7,
            CoseAlgorithm::EdDSA => -8,
            CoseAlgorithm::ES384 => -35,
            CoseAlgorithm::RS256 => -257,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(CoseAlgorithm::ES256),
            -8 => Some(CoseAlgorithm::EdDSA),
            -35 => Some(CoseAlgorithm::ES384),
            -257 => Some(CoseAlgorithm::RS256),
            _ => None,
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = CeremonyError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(CeremonyError::UnsupportedAlgorithm(id))
    }
}

/// A decoded credential public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoseKey {
    /// Elliptic curve key with uncompressed coordinates
    Ec2 {
        alg: CoseAlgorithm,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    /// Octet key pair (Ed25519)
    Okp { alg: CoseAlgorithm, x: Vec<u8> },
    /// RSA modulus and exponent, big-endian
    Rsa {
        alg: CoseAlgorithm,
        n: Vec<u8>,
        e: Vec<u8>,
    },
}

impl CoseKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| CeremonyError::Malformed(format!("Invalid public key CBOR: {e}")))?;
        Self::from_cbor(&value)
    }

    pub fn from_cbor(value: &CborValue) -> Result<Self, CeremonyError> {
        let CborValue::Map(entries) = value else {
            return Err(CeremonyError::Malformed(
                "COSE key is not a CBOR map".to_string(),
            ));
        };

        let kty = int_param(entries, LABEL_KTY)?
            .ok_or_else(|| CeremonyError::Malformed("COSE key missing kty".to_string()))?;
        let alg_id = int_param(entries, LABEL_ALG)?
            .ok_or_else(|| CeremonyError::Malformed("COSE key missing alg".to_string()))?;
        let alg = CoseAlgorithm::try_from(alg_id)?;

        match (kty, alg) {
            (KTY_EC2, CoseAlgorithm::ES256 | CoseAlgorithm::ES384) => {
                let (expected_crv, coord_len) = match alg {
                    CoseAlgorithm::ES256 => (CRV_P256, 32),
                    _ => (CRV_P384, 48),
                };
                let crv = int_param(entries, LABEL_CRV)?
                    .ok_or_else(|| CeremonyError::Malformed("EC2 key missing crv".to_string()))?;
                if crv != expected_crv {
                    return Err(CeremonyError::Malformed(format!(
                        "Curve {crv} does not match algorithm {alg_id}"
                    )));
                }
                let x = bytes_param(entries, LABEL_X)?;
                let y = bytes_param(entries, LABEL_Y)?;
                if x.len() != coord_len || y.len() != coord_len {
                    return Err(CeremonyError::Malformed(
                        "Invalid EC2 coordinate length".to_string(),
                    ));
                }
                Ok(CoseKey::Ec2 { alg, x, y })
            }
            (KTY_OKP, CoseAlgorithm::EdDSA) => {
                let crv = int_param(entries, LABEL_CRV)?
                    .ok_or_else(|| CeremonyError::Malformed("OKP key missing crv".to_string()))?;
                if crv != CRV_ED25519 {
                    return Err(CeremonyError::Malformed(format!(
                        "Unsupported OKP curve: {crv}"
                    )));
                }
                let x = bytes_param(entries, LABEL_X)?;
                if x.len() != 32 {
                    return Err(CeremonyError::Malformed(
                        "Invalid Ed25519 key length".to_string(),
                    ));
                }
                Ok(CoseKey::Okp { alg, x })
            }
            (KTY_RSA, CoseAlgorithm::RS256) => {
                let n = bytes_param(entries, LABEL_N)?;
                let e = bytes_param(entries, LABEL_E)?;
                Ok(CoseKey::Rsa { alg, n, e })
            }
            _ => Err(CeremonyError::Malformed(format!(
                "Key type {kty} is inconsistent with algorithm {alg_id}"
            ))),
        }
    }

    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Okp { alg, .. } | CoseKey::Rsa { alg, .. } => *alg,
        }
    }

    /// SEC1 uncompressed point (0x04 || x || y) for EC2 keys.
    pub(crate) fn uncompressed_point(&self) -> Option<Vec<u8>> {
        match self {
            CoseKey::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    pub fn to_cbor(&self) -> CborValue {
        let int = |i: i64| CborValue::Integer(Integer::from(i));
        let entries = match self {
            CoseKey::Ec2 { alg, x, y } => {
                let crv = if *alg == CoseAlgorithm::ES384 {
                    CRV_P384
                } else {
                    CRV_P256
                };
                vec![
                    (int(LABEL_KTY), int(KTY_EC2)),
                    (int(LABEL_ALG), int(alg.id())),
                    (int(LABEL_CRV), int(crv)),
                    (int(LABEL_X), CborValue::Bytes(x.clone())),
                    (int(LABEL_Y), CborValue::Bytes(y.clone())),
                ]
            }
            CoseKey::Okp { alg, x } => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_ALG), int(alg.id())),
                (int(LABEL_CRV), int(CRV_ED25519)),
                (int(LABEL_X), CborValue::Bytes(x.clone())),
            ],
            CoseKey::Rsa { alg, n, e } => vec![
                (int(LABEL_KTY), int(KTY_RSA)),
                (int(LABEL_ALG), int(alg.id())),
                (int(LABEL_N), CborValue::Bytes(n.clone())),
                (int(LABEL_E), CborValue::Bytes(e.clone())),
            ],
        };
        CborValue::Map(entries)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(&self.to_cbor(), &mut out)
            .map_err(|e| CeremonyError::Malformed(format!("Failed to encode COSE key: {e}")))?;
        Ok(out)
    }
}

pub(crate) fn cbor_to_i64(value: &CborValue) -> Option<i64> {
    match value {
        CborValue::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn find_param(entries: &[(CborValue, CborValue)], label: i64) -> Option<&CborValue> {
    entries
        .iter()
        .find(|(k, _)| cbor_to_i64(k) == Some(label))
        .map(|(_, v)| v)
}

fn int_param(entries: &[(CborValue, CborValue)], label: i64) -> Result<Option<i64>, CeremonyError> {
    match find_param(entries, label) {
        None => Ok(None),
        Some(v) => cbor_to_i64(v).map(Some).ok_or_else(|| {
            CeremonyError::Malformed(format!("COSE parameter {label} is not an integer"))
        }),
    }
}

fn bytes_param(entries: &[(CborValue, CborValue)], label: i64) -> Result<Vec<u8>, CeremonyError> {
    match find_param(entries, label) {
        Some(CborValue::Bytes(b)) => Ok(b.clone()),
        Some(_) => Err(CeremonyError::Malformed(format!(
            "COSE parameter {label} is not a byte string"
        ))),
        None => Err(CeremonyError::Malformed(format!(
            "COSE key missing parameter {label}"
        ))),
    }
}

use ciborium::value::Value as CborValue;

use crate::passkey::errors::CeremonyError;

use super::utils::rejected;

/// `none` carries no statement; anything in attStmt is a malformed response.
pub(super) fn verify_none_attestation(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<(), CeremonyError> {
    if !att_stmt.is_empty() {
        return Err(rejected("attStmt must be empty for none attestation"));
    }
    Ok(())
}

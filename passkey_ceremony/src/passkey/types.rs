use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{base64url_bytes, base64url_decode, base64url_encode, sha256};

/// Authenticator-assigned credential identifier.
///
/// Opaque bytes, compared byte-for-byte. Serialized and displayed as unpadded
/// base64url, the form browsers use for `rawId`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(#[serde(with = "base64url_bytes")] Vec<u8>);

impl CredentialId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parses the base64url text form.
    pub fn from_base64url(s: &str) -> Option<Self> {
        base64url_decode(s).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        base64url_encode(&self.0)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.to_base64url())
    }
}

/// WebAuthn user handle (`user.id` in creation options).
///
/// Derived as SHA-256 over the username's UTF-8 bytes exactly as supplied;
/// no Unicode normalization is applied, matching the byte-exact username
/// comparison used by the credential store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserHandle(#[serde(with = "base64url_bytes")] Vec<u8>);

impl UserHandle {
    pub fn from_username(username: &str) -> Self {
        Self(sha256(username.as_bytes()).to_vec())
    }

    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserHandle({})", base64url_encode(&self.0))
    }
}

/// A user as seen by the ceremonies. Not persisted on its own; it exists
/// through the credentials enrolled under `username`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub display_name: String,
}

impl User {
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    pub fn user_handle(&self) -> UserHandle {
        UserHandle::from_username(&self.username)
    }
}

/// Stored credential information for an enrolled passkey.
///
/// Owned by the credential store. Created by a registration ceremony and
/// afterwards only its counter and `last_used_at` change.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Credential {
    /// Raw credential ID bytes, unique across the whole store
    pub id: CredentialId,
    /// COSE_Key bytes exactly as found in the attested credential data
    #[serde(with = "base64url_bytes")]
    pub public_key: Vec<u8>,
    pub owner_username: String,
    pub user_handle: UserHandle,
    /// AAGUID of the authenticator, hyphenated
    pub aaguid: String,
    /// Last accepted signature counter; 0 for authenticators that do not count
    pub signature_counter: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn descriptor(&self) -> CredentialDescriptor {
        CredentialDescriptor::public_key(self.id.clone())
    }
}

/// `PublicKeyCredentialDescriptor` as used in `excludeCredentials` and `allowCredentials`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: CredentialId,
}

impl CredentialDescriptor {
    pub fn public_key(id: CredentialId) -> Self {
        Self {
            type_: "public-key".to_string(),
            id,
        }
    }
}

/// Which ceremony a challenge was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeremonyKind {
    Registration,
    Assertion,
}

impl CeremonyKind {
    /// The `type` member clientDataJSON must carry for this ceremony.
    pub(crate) fn client_data_type(self) -> &'static str {
        match self {
            CeremonyKind::Registration => "webauthn.create",
            CeremonyKind::Assertion => "webauthn.get",
        }
    }
}

/// Opaque handle a caller uses to complete the ceremony it started.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CeremonyId(String);

impl CeremonyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CeremonyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CeremonyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CeremonyId({})", self.0)
    }
}

/// A pending ceremony: the single-use challenge and what it was issued for.
#[derive(Clone, Debug, PartialEq)]
pub struct Ceremony {
    pub id: CeremonyId,
    pub kind: CeremonyKind,
    pub challenge: Vec<u8>,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Ceremony {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

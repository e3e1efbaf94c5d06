//! passkey_ceremony - WebAuthn / FIDO2 relying-party ceremony core
//!
//! Issues registration and authentication challenges, verifies the
//! attestation and assertion responses authenticators produce, and keeps the
//! per-user credential store whose signature counters detect cloned
//! authenticators.
//!
//! Transport is left to the caller: hand a [`RegistrationCeremony`] or
//! [`AssertionCeremony`] the decoded response together with the ceremony id
//! returned when the options were issued.

mod config;
mod passkey;
mod storage;
mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{AttestationPreference, RelyingPartyPolicy, UserVerification};

pub use passkey::{
    AssertionCeremony, AssertionOptions, AssertionResponse, AttestationPolicy, AttestationType,
    AuthenticatorAssertionResponse, AuthenticatorAttestationResponse, AuthenticatorSelection,
    Ceremony, CeremonyError, CeremonyId, CeremonyKind, CoseAlgorithm, CoseKey, Credential,
    CredentialCreationOptions, CredentialDescriptor, CredentialId, DefaultAttestationPolicy,
    PubKeyCredParam, PublicKeyCredentialUserEntity, RegistrationCeremony, RegistrationResponse,
    RelyingParty, RingSignatureVerifier, SignatureVerifier, User, UserHandle, VerifiedAttestation,
    signed_payload,
};

pub use storage::{
    ChallengeStore, CredentialStore, DEFAULT_CHALLENGE_TTL_SECS, InMemoryChallengeStore,
    InMemoryCredentialStore, StorageError,
};

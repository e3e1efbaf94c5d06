mod errors;
mod main;
mod types;

pub use errors::CeremonyError;

pub use main::{
    AssertionCeremony, AssertionOptions, AssertionResponse, AttestationPolicy, AttestationType,
    AuthenticatorAssertionResponse, AuthenticatorAttestationResponse, AuthenticatorSelection,
    CoseAlgorithm, CoseKey, CredentialCreationOptions, DefaultAttestationPolicy, PubKeyCredParam,
    PublicKeyCredentialUserEntity, RegistrationCeremony, RegistrationResponse, RelyingParty,
    RingSignatureVerifier, SignatureVerifier, VerifiedAttestation, signed_payload,
};

pub use types::{
    Ceremony, CeremonyId, CeremonyKind, Credential, CredentialDescriptor, CredentialId, User,
    UserHandle,
};

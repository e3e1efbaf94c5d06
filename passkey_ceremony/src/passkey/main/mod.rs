mod attestation;
mod auth;
mod challenge;
mod cose;
mod register;
mod types;
mod verifier;

pub use attestation::{
    AttestationPolicy, AttestationType, DefaultAttestationPolicy, VerifiedAttestation,
};
pub use auth::AssertionCeremony;
pub use cose::{CoseAlgorithm, CoseKey};
pub use register::RegistrationCeremony;
pub use types::{
    AssertionOptions, AssertionResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, AuthenticatorSelection, CredentialCreationOptions,
    PubKeyCredParam, PublicKeyCredentialUserEntity, RegistrationResponse, RelyingParty,
};
pub use verifier::{RingSignatureVerifier, SignatureVerifier, signed_payload};

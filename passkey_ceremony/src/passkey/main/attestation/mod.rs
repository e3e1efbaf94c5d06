mod core;
mod none;
mod packed;
mod u2f;
mod utils;

pub use core::{AttestationPolicy, AttestationType, DefaultAttestationPolicy, VerifiedAttestation};

pub(super) use core::verify_attestation;

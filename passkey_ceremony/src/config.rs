use std::env;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::passkey::{CeremonyError, CoseAlgorithm};
use crate::storage::DEFAULT_CHALLENGE_TTL_SECS;

const DEFAULT_TIMEOUT_MS: u32 = 60_000;

/// `attestation` conveyance preference placed in creation options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationPreference {
    None,
    Indirect,
    Direct,
    Enterprise,
}

/// `userVerification` requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

/// Relying-party policy shared by both ceremonies.
///
/// Supplied once at construction and never re-derived per call.
#[derive(Clone, Debug)]
pub struct RelyingPartyPolicy {
    pub rp_id: String,
    pub rp_name: String,
    pub origins: Vec<String>,
    pub algorithms: Vec<CoseAlgorithm>,
    pub attestation: AttestationPreference,
    pub user_verification: UserVerification,
    /// Applied by the challenge store, see `InMemoryChallengeStore::from_policy`
    pub challenge_ttl: Duration,
    pub timeout_ms: u32,
}

impl RelyingPartyPolicy {
    pub fn new(
        rp_id: impl Into<String>,
        rp_name: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            rp_id: rp_id.into(),
            rp_name: rp_name.into(),
            origins: vec![origin.into()],
            algorithms: vec![
                CoseAlgorithm::ES256,
                CoseAlgorithm::EdDSA,
                CoseAlgorithm::RS256,
            ],
            attestation: AttestationPreference::None,
            user_verification: UserVerification::Discouraged,
            challenge_ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<CoseAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_attestation(mut self, attestation: AttestationPreference) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn with_user_verification(mut self, user_verification: UserVerification) -> Self {
        self.user_verification = user_verification;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the policy from environment variables.
    ///
    /// `ORIGIN` is required and may hold a comma separated list. `PASSKEY_RP_ID`
    /// defaults to the host of the first origin and `PASSKEY_RP_NAME` to the RP ID.
    pub fn from_env() -> Result<Self, CeremonyError> {
        let origins: Vec<String> = env::var("ORIGIN")
            .map_err(|_| CeremonyError::Config("ORIGIN must be set".to_string()))?
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let first = origins
            .first()
            .ok_or_else(|| CeremonyError::Config("ORIGIN must not be empty".to_string()))?;

        let rp_id = match env::var("PASSKEY_RP_ID") {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => rp_id_from_origin(first)?,
        };
        let rp_name = env::var("PASSKEY_RP_NAME").unwrap_or_else(|_| rp_id.clone());

        let mut policy = Self::new(rp_id, rp_name, first.clone());
        policy.origins = origins;
        policy.challenge_ttl = Duration::seconds(env_seconds(
            "PASSKEY_CHALLENGE_TIMEOUT",
            DEFAULT_CHALLENGE_TTL_SECS,
        ));
        policy.timeout_ms =
            (env_seconds("PASSKEY_TIMEOUT", (DEFAULT_TIMEOUT_MS / 1000) as i64) as u32)
                .saturating_mul(1000);
        policy.user_verification = env_user_verification();
        policy.attestation = env_attestation();

        policy.validate()?;
        tracing::debug!("Relying party policy: {:?}", policy);
        Ok(policy)
    }

    /// Reject policies the ceremonies cannot operate under.
    pub fn validate(&self) -> Result<(), CeremonyError> {
        if self.rp_id.trim().is_empty() {
            return Err(CeremonyError::Config("RP ID must not be empty".to_string()));
        }
        if self.origins.is_empty() {
            return Err(CeremonyError::Config(
                "At least one origin is required".to_string(),
            ));
        }
        for origin in &self.origins {
            Url::parse(origin)
                .map_err(|e| CeremonyError::Config(format!("Invalid origin {origin}: {e}")))?;
        }
        if self.algorithms.is_empty() {
            return Err(CeremonyError::Config(
                "At least one public key algorithm is required".to_string(),
            ));
        }
        if self.challenge_ttl <= Duration::zero() {
            return Err(CeremonyError::Config(
                "Challenge TTL must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn accepts_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn accepts_algorithm(&self, alg: CoseAlgorithm) -> bool {
        self.algorithms.contains(&alg)
    }
}

fn rp_id_from_origin(origin: &str) -> Result<String, CeremonyError> {
    let url = Url::parse(origin)
        .map_err(|e| CeremonyError::Config(format!("Invalid ORIGIN {origin}: {e}")))?;
    url.host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| CeremonyError::Config(format!("Could not extract RP ID from {origin}")))
}

fn env_seconds(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Err(_) => default,
        Ok(v) => match v.parse::<i64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                tracing::warn!("Invalid {}: {}. Using default {}", name, v, default);
                default
            }
        },
    }
}

fn env_user_verification() -> UserVerification {
    match env::var("PASSKEY_USER_VERIFICATION").ok() {
        None => UserVerification::Discouraged,
        Some(v) => match v.to_lowercase().as_str() {
            "required" => UserVerification::Required,
            "preferred" => UserVerification::Preferred,
            "discouraged" => UserVerification::Discouraged,
            invalid => {
                tracing::warn!(
                    "Invalid user verification: {}. Using default 'discouraged'",
                    invalid
                );
                UserVerification::Discouraged
            }
        },
    }
}

fn env_attestation() -> AttestationPreference {
    match env::var("PASSKEY_ATTESTATION").ok() {
        None => AttestationPreference::None,
        Some(v) => match v.to_lowercase().as_str() {
            "none" => AttestationPreference::None,
            "indirect" => AttestationPreference::Indirect,
            "direct" => AttestationPreference::Direct,
            "enterprise" => AttestationPreference::Enterprise,
            invalid => {
                tracing::warn!("Invalid attestation: {}. Using default 'none'", invalid);
                AttestationPreference::None
            }
        },
    }
}

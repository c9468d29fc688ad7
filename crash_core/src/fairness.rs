use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::outcome::{OutcomeClient, ServiceError};

// Commit-reveal: the service publishes sha256(server_seed) before play and the
// seed itself after settlement. Anyone holding both can recompute the digest.

/// Largest crash point difference still treated as the same value.
pub const CRASH_POINT_EPSILON: f64 = 0.005;

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Fresh client seed for one round: 16 random bytes, hex encoded.
pub fn generate_client_seed(rng: &mut impl RngCore) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn crash_points_match(reported: f64, observed: f64) -> bool {
    (reported - observed).abs() < CRASH_POINT_EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Verified,
    /// Seed and commitment agree but the recomputed crash point is off.
    CrashPointMismatch,
    /// The revealed seed does not hash to the published commitment.
    HashMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub round_id: String,
    pub revealed_seed: String,
    pub commit_hash: String,
    pub recomputed_hash: String,
    pub hash_verified: bool,
    pub reported_crash_point: f64,
    pub observed_crash_point: f64,
    pub crash_point_matches: bool,
    pub status: VerificationStatus,
    pub message: String,
}

impl VerificationRecord {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

pub struct FairnessVerifier;

impl FairnessVerifier {
    /// Both checks always run; a hash failure outranks a crash point mismatch.
    pub fn verify(
        round_id: &str,
        revealed_seed: &str,
        commit_hash: &str,
        reported_crash_point: f64,
        observed_crash_point: f64,
    ) -> VerificationRecord {
        let recomputed_hash = derive_hash_hex(revealed_seed.as_bytes());
        let hash_verified = recomputed_hash.eq_ignore_ascii_case(commit_hash.trim());
        let crash_point_matches = crash_points_match(reported_crash_point, observed_crash_point);

        let (status, message) = match (hash_verified, crash_point_matches) {
            (false, _) => (
                VerificationStatus::HashMismatch,
                format!(
                    "FAIRNESS VIOLATION: revealed seed hashes to {recomputed_hash}, \
                     but the round was committed to {commit_hash}"
                ),
            ),
            (true, false) => (
                VerificationStatus::CrashPointMismatch,
                format!(
                    "Seed commitment verified, but the service reports crash point \
                     {reported_crash_point:.2}x while {observed_crash_point:.2}x was played"
                ),
            ),
            (true, true) => (
                VerificationStatus::Verified,
                format!("Round verified: crash point {reported_crash_point:.2}x matches"),
            ),
        };

        match status {
            VerificationStatus::HashMismatch => {
                error!(round_id, commit_hash, %recomputed_hash, "seed commitment mismatch")
            }
            VerificationStatus::CrashPointMismatch => warn!(
                round_id,
                reported_crash_point, observed_crash_point, "crash point mismatch"
            ),
            VerificationStatus::Verified => info!(round_id, "round verified"),
        }

        VerificationRecord {
            round_id: round_id.to_string(),
            revealed_seed: revealed_seed.to_string(),
            commit_hash: commit_hash.to_string(),
            recomputed_hash,
            hash_verified,
            reported_crash_point,
            observed_crash_point,
            crash_point_matches,
            status,
            message,
        }
    }

    /// Asks the service to reveal the seed of a settled round and to recompute
    /// its crash point, then runs [`FairnessVerifier::verify`] on the answers.
    pub async fn check_with_service<C: OutcomeClient>(
        client: &C,
        round_id: &str,
        commit_hash: &str,
        client_seed: &str,
        nonce: u64,
        observed_crash_point: f64,
    ) -> Result<VerificationRecord, ServiceError> {
        let revealed = client.reveal_seed(round_id).await?;
        let reported = client
            .verify_round(round_id, &revealed, client_seed, nonce)
            .await?;
        Ok(Self::verify(
            round_id,
            &revealed,
            commit_hash,
            reported,
            observed_crash_point,
        ))
    }
}

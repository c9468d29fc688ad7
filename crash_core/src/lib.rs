pub mod animation;
pub mod arbiter;
pub mod autoplay;
pub mod controller;
pub mod fairness;
pub mod history;
pub mod outcome;
pub mod params;
pub mod round;

pub use crate::animation::{multiplier_at, time_to_reach, AnimationDriver, AnimationHandle};
pub use crate::arbiter::{CashoutArbiter, Trigger};
pub use crate::autoplay::{
    AutoplayDecision, AutoplayError, AutoplayOutcome, AutoplayScheduler, AutoplaySession,
    AutoplayState,
};
pub use crate::controller::{validate_bet, RoundController, RoundError};
pub use crate::fairness::{
    derive_hash_hex, generate_client_seed, FairnessVerifier, VerificationRecord,
    VerificationStatus, CRASH_POINT_EPSILON,
};
pub use crate::history::HistoryLedger;
pub use crate::outcome::{HttpOutcomeClient, OutcomeClient, RoundCommitment, ServiceError};
pub use crate::params::{EngineParams, MIN_AUTO_CASHOUT, ROUND_NONCE};
pub use crate::round::{
    BetRequest, HistoryEntry, OutcomeKind, RoundOutcome, RoundState, RoundView, Settlement,
};
pub use crash_shared::ApiError;

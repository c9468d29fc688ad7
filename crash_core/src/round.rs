use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::arbiter::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    Initializing,
    Running,
    Settling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
    pub stake: f64,
    /// Auto-cashout threshold, `None` when disabled.
    pub auto_cashout: Option<f64>,
}

impl BetRequest {
    pub fn new(stake: f64) -> Self {
        Self {
            stake,
            auto_cashout: None,
        }
    }

    pub fn with_auto_cashout(stake: f64, threshold: f64) -> Self {
        Self {
            stake,
            auto_cashout: Some(threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    CashedOut,
    Crashed,
}

/// Outcome of the service round-trip, fixed for the rest of the round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundOutcome {
    pub will_auto_cashout: bool,
    pub final_multiplier: f64,
    pub crash_point: f64,
}

impl RoundOutcome {
    pub fn resolve(crash_point: f64, auto_cashout: Option<f64>) -> Self {
        match auto_cashout {
            Some(threshold) if crash_point >= threshold => Self {
                will_auto_cashout: true,
                final_multiplier: threshold,
                crash_point,
            },
            _ => Self {
                will_auto_cashout: false,
                final_multiplier: crash_point,
                crash_point,
            },
        }
    }
}

/// A round between bet placement and settlement. Owned by the controller.
#[derive(Debug, Clone)]
pub(crate) struct Round {
    pub id: String,
    pub stake: f64,
    pub commit_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub auto_cashout: Option<f64>,
    pub outcome: RoundOutcome,
    pub autoplay_label: Option<String>,
}

impl Round {
    pub fn target(&self) -> f64 {
        self.outcome.final_multiplier
    }
}

/// What a client may see of the running round. Carries no outcome-derived
/// value: the target and crash point stay hidden until settlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    pub round_id: String,
    pub stake: f64,
    pub commit_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub auto_cashout: Option<f64>,
    pub state: RoundState,
    pub displayed_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub round_id: String,
    pub stake: f64,
    pub trigger: Trigger,
    pub kind: OutcomeKind,
    pub multiplier: f64,
    pub payout: f64,
    pub crash_point: f64,
    pub auto_cashout_fired: bool,
    pub balance_after: f64,
}

impl Settlement {
    pub fn is_win(&self) -> bool {
        self.kind == OutcomeKind::CashedOut
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub short_id: String,
    pub stake: f64,
    pub kind: OutcomeKind,
    pub multiplier: f64,
    pub payout: f64,
    pub auto_cashout_fired: bool,
    pub autoplay_label: Option<String>,
    pub settled_at: DateTime<Utc>,
}

pub(crate) fn short_id(round_id: &str) -> String {
    round_id.chars().take(8).collect()
}

use std::sync::Arc;

use chrono::Utc;
use crash_shared::ApiError;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::animation::{AnimationDriver, AnimationHandle};
use crate::arbiter::{CashoutArbiter, Trigger};
use crate::fairness::{generate_client_seed, FairnessVerifier, VerificationRecord};
use crate::history::HistoryLedger;
use crate::outcome::{OutcomeClient, ServiceError};
use crate::params::{EngineParams, MIN_AUTO_CASHOUT, ROUND_NONCE};
use crate::round::{
    short_id, BetRequest, HistoryEntry, OutcomeKind, Round, RoundOutcome,
    RoundState, RoundView, Settlement,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RoundError {
    #[error("invalid bet: {0}")]
    Validation(String),
    #[error("a round is already in progress")]
    RoundInProgress,
    #[error("no round in progress")]
    NoActiveRound,
    #[error("no settled round to verify")]
    NothingToVerify,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

struct ActiveRound {
    round: Round,
    arbiter: Arc<CashoutArbiter>,
    animation: AnimationHandle,
    /// Multiplier and instant of an accepted manual request awaiting acknowledgment.
    manual: Option<(f64, Instant)>,
}

/// Material needed to check a settled round against its commitment.
#[derive(Debug, Clone)]
struct SettledRound {
    round_id: String,
    commit_hash: String,
    client_seed: String,
    nonce: u64,
    crash_point: f64,
}

/// Owns the balance, the live round and the session history.
pub struct RoundController<C> {
    client: C,
    params: EngineParams,
    balance: f64,
    state: RoundState,
    active: Option<ActiveRound>,
    history: HistoryLedger,
    last_settled: Option<SettledRound>,
    last_verification: Option<VerificationRecord>,
    autoplay_label: Option<String>,
}

pub fn validate_bet(bet: &BetRequest, balance: f64) -> Result<(), RoundError> {
    if !bet.stake.is_finite() || bet.stake <= 0.0 {
        return Err(RoundError::Validation(
            "stake must be greater than zero".to_string(),
        ));
    }
    if bet.stake > balance {
        return Err(RoundError::Validation(format!(
            "stake {:.2} exceeds balance {:.2}",
            bet.stake, balance
        )));
    }
    if let Some(threshold) = bet.auto_cashout {
        if !threshold.is_finite() || threshold < MIN_AUTO_CASHOUT {
            return Err(RoundError::Validation(format!(
                "auto-cashout must be at least {MIN_AUTO_CASHOUT:.2}x"
            )));
        }
    }
    Ok(())
}

/// Keeps only the crash point from the client; the auto-cashout decision is
/// always re-derived from it and the bet's threshold.
fn check_outcome(
    reported: RoundOutcome,
    auto_cashout: Option<f64>,
) -> Result<RoundOutcome, ServiceError> {
    if reported.crash_point.is_finite() && reported.crash_point >= 1.0 {
        Ok(RoundOutcome::resolve(reported.crash_point, auto_cashout))
    } else {
        Err(ServiceError::OutcomeComputation(ApiError::Malformed(format!(
            "crash point {} is out of range",
            reported.crash_point
        ))))
    }
}

/// A bet between `Idle` and `Running`. Dropping it before `commit`, on an
/// error or because the `place_bet` future was dropped, puts back the stake
/// and returns the controller to `Idle`.
struct PendingBet<'a> {
    balance: &'a mut f64,
    state: &'a mut RoundState,
    balance_before: Option<f64>,
    committed: bool,
}

impl<'a> PendingBet<'a> {
    fn begin(balance: &'a mut f64, state: &'a mut RoundState) -> Self {
        *state = RoundState::Initializing;
        Self {
            balance,
            state,
            balance_before: None,
            committed: false,
        }
    }

    fn take_stake(&mut self, stake: f64) {
        self.balance_before = Some(*self.balance);
        *self.balance -= stake;
    }

    fn commit(mut self) {
        *self.state = RoundState::Running;
        self.committed = true;
    }
}

impl Drop for PendingBet<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(before) = self.balance_before {
            *self.balance = before;
            warn!(balance = before, "bet abandoned, stake refunded");
        }
        *self.state = RoundState::Idle;
    }
}

impl<C: OutcomeClient> RoundController<C> {
    pub fn new(client: C, balance: f64, params: EngineParams) -> Self {
        let history = HistoryLedger::with_capacity(params.history_capacity);
        Self {
            client,
            params,
            balance,
            state: RoundState::Idle,
            active: None,
            history,
            last_settled: None,
            last_verification: None,
            autoplay_label: None,
        }
    }

    /// Validates the bet, commits a round with the service, takes the stake
    /// and fetches the outcome. Returns once the round is running.
    pub async fn place_bet(&mut self, bet: BetRequest) -> Result<RoundView, RoundError> {
        if self.state != RoundState::Idle || self.active.is_some() {
            return Err(RoundError::RoundInProgress);
        }
        validate_bet(&bet, self.balance)?;

        self.last_settled = None;
        self.last_verification = None;
        let mut pending = PendingBet::begin(&mut self.balance, &mut self.state);
        info!(stake = bet.stake, auto_cashout = ?bet.auto_cashout, "placing bet");

        let commitment = match self.client.init_round().await {
            Ok(commitment) => commitment,
            Err(e) => {
                warn!(error = %e, "round init failed, no funds moved");
                return Err(e.into());
            }
        };

        pending.take_stake(bet.stake);
        let client_seed = generate_client_seed(&mut rand::thread_rng());
        let nonce = ROUND_NONCE;

        let outcome = match self
            .client
            .compute_outcome(&commitment.round_id, &client_seed, nonce, bet.auto_cashout)
            .await
            .and_then(|reported| check_outcome(reported, bet.auto_cashout))
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(round_id = %commitment.round_id, error = %e, stake = bet.stake, "outcome failed");
                return Err(e.into());
            }
        };

        let round = Round {
            id: commitment.round_id,
            stake: bet.stake,
            commit_hash: commitment.commit_hash,
            client_seed,
            nonce,
            auto_cashout: bet.auto_cashout,
            outcome,
            autoplay_label: self.autoplay_label.take(),
        };
        let arbiter = Arc::new(CashoutArbiter::new());
        let animation = AnimationDriver::start(
            round.target(),
            self.params.tick,
            self.params.growth_tau_secs,
            arbiter.clone(),
        );
        info!(round_id = %round.id, commit_hash = %round.commit_hash, "round running");

        self.active = Some(ActiveRound {
            round,
            arbiter,
            animation,
            manual: None,
        });
        pending.commit();
        self.active_round().ok_or(RoundError::NoActiveRound)
    }

    /// Manual cashout at the multiplier displayed at the moment of the call.
    ///
    /// If the automatic path already claimed the round, this request has no
    /// effect of its own and the returned settlement is the automatic one.
    pub async fn cash_out(&mut self) -> Result<Settlement, RoundError> {
        let Some(active) = self.active.as_mut() else {
            return Err(RoundError::NoActiveRound);
        };
        if active.manual.is_none() {
            let displayed = active.animation.displayed();
            match active.arbiter.claim(Trigger::Manual) {
                Ok(()) => {
                    active.animation.cancel();
                    active.manual = Some((displayed, Instant::now()));
                    self.state = RoundState::Settling;
                    info!(round_id = %active.round.id, multiplier = displayed, "manual cashout accepted");
                }
                Err(winner) => {
                    debug!(round_id = %active.round.id, ?winner, "cashout already claimed, manual request ignored");
                }
            }
        }
        self.wait_for_settlement().await
    }

    /// Waits for the running round to settle: either an accepted manual
    /// request finishing its acknowledgment delay, or the animation reaching
    /// the target. Cancel-safe.
    pub async fn wait_for_settlement(&mut self) -> Result<Settlement, RoundError> {
        let confirm_delay = self.params.cashout_confirm_delay;
        let Some(active) = self.active.as_mut() else {
            return Err(RoundError::NoActiveRound);
        };

        if let Some((multiplier, requested_at)) = active.manual {
            time::sleep_until(requested_at + confirm_delay).await;
            return self.settle(Trigger::Manual, multiplier);
        }

        if !active.animation.target_reached().await {
            match active.arbiter.claim(Trigger::Automatic) {
                Ok(()) => {
                    warn!(round_id = %active.round.id, "animation stopped early, settling at target")
                }
                Err(Trigger::Manual) => {
                    // Claimed manually without going through cash_out.
                    let displayed = active.animation.displayed();
                    return self.settle(Trigger::Manual, displayed);
                }
                Err(Trigger::Automatic) => {}
            }
        }
        let target = active.round.target();
        self.settle(Trigger::Automatic, target)
    }

    /// Applies the single settlement of the active round. Consumes the round,
    /// so any later call finds nothing to credit.
    fn settle(&mut self, trigger: Trigger, multiplier: f64) -> Result<Settlement, RoundError> {
        let Some(active) = self.active.take() else {
            return Err(RoundError::NoActiveRound);
        };
        self.state = RoundState::Settling;
        active.animation.cancel();
        let round = active.round;
        let outcome = round.outcome;

        let (kind, multiplier, auto_cashout_fired) = match trigger {
            Trigger::Manual => (OutcomeKind::CashedOut, multiplier.min(round.target()), false),
            Trigger::Automatic if outcome.will_auto_cashout => {
                (OutcomeKind::CashedOut, outcome.final_multiplier, true)
            }
            Trigger::Automatic => (OutcomeKind::Crashed, outcome.crash_point, false),
        };
        let payout = match kind {
            OutcomeKind::CashedOut => round.stake * multiplier,
            OutcomeKind::Crashed => 0.0,
        };
        self.balance += payout;

        self.history.push(HistoryEntry {
            short_id: short_id(&round.id),
            stake: round.stake,
            kind,
            multiplier,
            payout,
            auto_cashout_fired,
            autoplay_label: round.autoplay_label.clone(),
            settled_at: Utc::now(),
        });
        self.last_settled = Some(SettledRound {
            round_id: round.id.clone(),
            commit_hash: round.commit_hash.clone(),
            client_seed: round.client_seed.clone(),
            nonce: round.nonce,
            crash_point: outcome.crash_point,
        });
        self.state = RoundState::Idle;

        info!(
            round_id = %round.id,
            ?trigger,
            ?kind,
            multiplier,
            payout,
            crash_point = outcome.crash_point,
            balance = self.balance,
            "round settled"
        );

        Ok(Settlement {
            round_id: round.id,
            stake: round.stake,
            trigger,
            kind,
            multiplier,
            payout,
            crash_point: outcome.crash_point,
            auto_cashout_fired,
            balance_after: self.balance,
        })
    }

    /// Reveals the server seed of the last settled round and checks it
    /// against the commitment and the crash point that was played. Never
    /// touches balance or history.
    pub async fn verify_last_round(&mut self) -> Result<VerificationRecord, RoundError> {
        let settled = self
            .last_settled
            .clone()
            .ok_or(RoundError::NothingToVerify)?;
        let record = FairnessVerifier::check_with_service(
            &self.client,
            &settled.round_id,
            &settled.commit_hash,
            &settled.client_seed,
            settled.nonce,
            settled.crash_point,
        )
        .await?;
        self.last_verification = Some(record.clone());
        Ok(record)
    }

    pub fn set_autoplay_label(&mut self, label: Option<String>) {
        self.autoplay_label = label;
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn has_active_round(&self) -> bool {
        self.active.is_some()
    }

    pub fn displayed_multiplier(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.animation.displayed())
    }

    pub fn subscribe_multiplier(&self) -> Option<watch::Receiver<f64>> {
        self.active.as_ref().map(|a| a.animation.subscribe())
    }

    pub fn active_round(&self) -> Option<RoundView> {
        self.active.as_ref().map(|a| RoundView {
            round_id: a.round.id.clone(),
            stake: a.round.stake,
            commit_hash: a.round.commit_hash.clone(),
            client_seed: a.round.client_seed.clone(),
            nonce: a.round.nonce,
            auto_cashout: a.round.auto_cashout,
            state: self.state,
            displayed_multiplier: a.animation.displayed(),
        })
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn last_verification(&self) -> Option<&VerificationRecord> {
        self.last_verification.as_ref()
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

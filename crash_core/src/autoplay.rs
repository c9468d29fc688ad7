use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};

use crate::arbiter::Trigger;
use crate::controller::{RoundController, RoundError};
use crate::outcome::OutcomeClient;
use crate::round::{BetRequest, Settlement};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AutoplayError {
    #[error("autoplay requires auto-cashout to be enabled")]
    AutoCashoutDisabled,
    #[error("autoplay requires at least one round")]
    NoRounds,
    #[error("autoplay is already running")]
    AlreadyRunning,
    #[error("autoplay stopped: {0}")]
    Round(#[from] RoundError),
}

/// Running totals of one autoplay session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoplaySession {
    pub rounds_requested: u32,
    pub rounds_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_staked: f64,
    pub total_returned: f64,
}

impl AutoplaySession {
    pub fn new(rounds_requested: u32) -> Self {
        Self {
            rounds_requested,
            ..Self::default()
        }
    }

    fn with_settlement(&self, settlement: &Settlement) -> Self {
        let win = settlement.is_win();
        Self {
            rounds_requested: self.rounds_requested,
            rounds_played: self.rounds_played + 1,
            wins: self.wins + u32::from(win),
            losses: self.losses + u32::from(!win),
            total_staked: self.total_staked + settlement.stake,
            total_returned: self.total_returned + settlement.payout,
        }
    }

    pub fn net(&self) -> f64 {
        self.total_returned - self.total_staked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayState {
    Idle,
    /// `played` is the 1-based position of the current round.
    Running { played: u32, total: u32 },
    SummaryDisplay,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoplayDecision {
    NextRound,
    Interrupted(AutoplaySession),
    Completed(AutoplaySession),
    /// Settlement arrived while autoplay was not running.
    Inactive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoplayOutcome {
    Completed(AutoplaySession),
    Interrupted(AutoplaySession),
}

#[derive(Debug)]
pub struct AutoplayScheduler {
    state: AutoplayState,
    session: AutoplaySession,
}

impl Default for AutoplayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoplayScheduler {
    pub fn new() -> Self {
        Self {
            state: AutoplayState::Idle,
            session: AutoplaySession::default(),
        }
    }

    pub fn start(&mut self, rounds: u32, bet: &BetRequest) -> Result<(), AutoplayError> {
        if self.state != AutoplayState::Idle {
            return Err(AutoplayError::AlreadyRunning);
        }
        if bet.auto_cashout.is_none() {
            return Err(AutoplayError::AutoCashoutDisabled);
        }
        if rounds == 0 {
            return Err(AutoplayError::NoRounds);
        }
        self.session = AutoplaySession::new(rounds);
        self.state = AutoplayState::Running {
            played: 1,
            total: rounds,
        };
        info!(rounds, stake = bet.stake, "autoplay started");
        Ok(())
    }

    /// Label for the round about to be played, e.g. `"3/5"`.
    pub fn round_label(&self) -> Option<String> {
        match self.state {
            AutoplayState::Running { played, total } => Some(format!("{played}/{total}")),
            _ => None,
        }
    }

    pub fn on_settlement(&mut self, settlement: &Settlement) -> AutoplayDecision {
        let AutoplayState::Running { played, total } = self.state else {
            return AutoplayDecision::Inactive;
        };
        self.session = self.session.with_settlement(settlement);

        if settlement.trigger == Trigger::Manual {
            info!(played, total, "autoplay interrupted by manual cashout");
            self.state = AutoplayState::Idle;
            return AutoplayDecision::Interrupted(std::mem::take(&mut self.session));
        }
        if played < total {
            self.state = AutoplayState::Running {
                played: played + 1,
                total,
            };
            return AutoplayDecision::NextRound;
        }
        info!(
            wins = self.session.wins,
            losses = self.session.losses,
            net = self.session.net(),
            "autoplay complete"
        );
        self.state = AutoplayState::SummaryDisplay;
        AutoplayDecision::Completed(self.session.clone())
    }

    /// Leaves the summary display and clears the session.
    pub fn finish_summary(&mut self) {
        if self.state == AutoplayState::SummaryDisplay {
            self.state = AutoplayState::Idle;
            self.session = AutoplaySession::default();
        }
    }

    pub fn stop(&mut self) {
        self.state = AutoplayState::Idle;
        self.session = AutoplaySession::default();
    }

    pub fn state(&self) -> AutoplayState {
        self.state
    }

    pub fn played(&self) -> u32 {
        match self.state {
            AutoplayState::Running { played, .. } => played,
            AutoplayState::SummaryDisplay => self.session.rounds_played,
            AutoplayState::Idle => 0,
        }
    }

    pub fn session(&self) -> &AutoplaySession {
        &self.session
    }

    /// Plays up to `rounds` rounds of `bet` on `controller`. Any message on
    /// `manual` cashes out the running round and ends autoplay.
    pub async fn run<C: OutcomeClient>(
        &mut self,
        controller: &mut RoundController<C>,
        bet: BetRequest,
        rounds: u32,
        manual: &mut mpsc::Receiver<()>,
    ) -> Result<AutoplayOutcome, AutoplayError> {
        self.start(rounds, &bet)?;
        let round_delay = controller.params().autoplay_round_delay;
        let summary_window = controller.params().autoplay_summary_window;

        loop {
            // Requests made between rounds do not carry over.
            while manual.try_recv().is_ok() {}

            controller.set_autoplay_label(self.round_label());
            if let Err(e) = controller.place_bet(bet).await {
                warn!(error = %e, "autoplay round failed to start");
                self.stop();
                return Err(e.into());
            }

            let manual_requested = tokio::select! {
                settled = controller.wait_for_settlement() => Some(settled),
                Some(()) = manual.recv() => None,
            };
            let settled = match manual_requested {
                Some(settled) => settled,
                None => controller.cash_out().await,
            };
            let settlement = match settled {
                Ok(settlement) => settlement,
                Err(e) => {
                    self.stop();
                    return Err(e.into());
                }
            };

            match self.on_settlement(&settlement) {
                AutoplayDecision::NextRound => time::sleep(round_delay).await,
                AutoplayDecision::Interrupted(session) => {
                    return Ok(AutoplayOutcome::Interrupted(session))
                }
                AutoplayDecision::Completed(session) => {
                    time::sleep(summary_window).await;
                    self.finish_summary();
                    return Ok(AutoplayOutcome::Completed(session));
                }
                AutoplayDecision::Inactive => {
                    return Ok(AutoplayOutcome::Interrupted(self.session.clone()))
                }
            }
        }
    }
}

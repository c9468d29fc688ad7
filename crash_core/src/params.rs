use std::time::Duration;

/// Lowest auto-cashout threshold a bet may carry.
pub const MIN_AUTO_CASHOUT: f64 = 1.01;

/// Nonce used for every round. Each round has its own client seed, so a
/// single use per round is enough.
pub const ROUND_NONCE: u64 = 0;

#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Animation cadence.
    pub tick: Duration,
    /// Growth constant τ of `exp(t / τ)`, in seconds.
    pub growth_tau_secs: f64,
    /// Acknowledgment delay applied to a manual cashout.
    pub cashout_confirm_delay: Duration,
    /// Pause between autoplay rounds.
    pub autoplay_round_delay: Duration,
    /// How long the autoplay summary stays up before the scheduler resets.
    pub autoplay_summary_window: Duration,
    pub history_capacity: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            tick: Duration::from_micros(16_667),
            growth_tau_secs: 6.0,
            cashout_confirm_delay: Duration::from_millis(300),
            autoplay_round_delay: Duration::from_secs(1),
            autoplay_summary_window: Duration::from_secs(3),
            history_capacity: 10,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::arbiter::{CashoutArbiter, Trigger};

/// Growth curve of the displayed multiplier. Independent of the outcome: it
/// only decides when the target is reached, never what the target is.
pub fn multiplier_at(elapsed: Duration, growth_tau_secs: f64) -> f64 {
    (elapsed.as_secs_f64() / growth_tau_secs).exp()
}

/// Elapsed time at which the curve reaches `multiplier`.
pub fn time_to_reach(multiplier: f64, growth_tau_secs: f64) -> Duration {
    Duration::from_secs_f64(multiplier.max(1.0).ln() * growth_tau_secs)
}

fn floor_cents(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

/// Live animation of one round. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct AnimationHandle {
    task: JoinHandle<()>,
    display: watch::Receiver<f64>,
    reached: Option<oneshot::Receiver<()>>,
}

pub struct AnimationDriver;

impl AnimationDriver {
    /// Spawns the tick task. Emits floored values on `tick` cadence until the
    /// curve meets `target`, then emits exactly `target`, claims the arbiter
    /// for [`Trigger::Automatic`] and stops. Stops silently if the arbiter was
    /// already claimed.
    pub fn start(
        target: f64,
        tick: Duration,
        growth_tau_secs: f64,
        arbiter: Arc<CashoutArbiter>,
    ) -> AnimationHandle {
        let (display_tx, display) = watch::channel(1.0_f64);
        let (reached_tx, reached_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if arbiter.is_claimed() {
                    debug!("settlement already claimed, driver stopping");
                    return;
                }
                let raw = multiplier_at(started.elapsed(), growth_tau_secs);
                if raw >= target {
                    match arbiter.claim(Trigger::Automatic) {
                        Ok(()) => {
                            display_tx.send_replace(target);
                            let _ = reached_tx.send(());
                        }
                        Err(winner) => debug!(?winner, "target reached after settlement claim"),
                    }
                    return;
                }
                display_tx.send_replace(floor_cents(raw).min(target));
            }
        });

        AnimationHandle {
            task,
            display,
            reached: Some(reached_rx),
        }
    }
}

impl AnimationHandle {
    pub fn displayed(&self) -> f64 {
        *self.display.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.display.clone()
    }

    /// Resolves once the driver has claimed automatic settlement (`true`), or
    /// stopped without claiming it (`false`). Cancel-safe.
    pub async fn target_reached(&mut self) -> bool {
        let Some(rx) = self.reached.as_mut() else {
            return false;
        };
        let fired = rx.await.is_ok();
        self.reached = None;
        fired
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

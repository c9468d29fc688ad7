use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Which path claimed settlement of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Manual,
    Automatic,
}

const PENDING: u8 = 0;
const MANUAL: u8 = 1;
const AUTOMATIC: u8 = 2;

impl Trigger {
    fn encode(self) -> u8 {
        match self {
            Trigger::Manual => MANUAL,
            Trigger::Automatic => AUTOMATIC,
        }
    }

    fn decode(v: u8) -> Option<Self> {
        match v {
            MANUAL => Some(Trigger::Manual),
            AUTOMATIC => Some(Trigger::Automatic),
            _ => None,
        }
    }
}

/// Settlement gate shared by the manual cashout path and the animation
/// driver. Exactly one `claim` per round succeeds.
#[derive(Debug, Default)]
pub struct CashoutArbiter {
    state: AtomicU8,
}

impl CashoutArbiter {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Claims settlement for `trigger`. On failure returns the path that won.
    pub fn claim(&self, trigger: Trigger) -> Result<(), Trigger> {
        match self
            .state
            .compare_exchange(PENDING, trigger.encode(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) => Err(Trigger::decode(current).unwrap_or(trigger)),
        }
    }

    pub fn winner(&self) -> Option<Trigger> {
        Trigger::decode(self.state.load(Ordering::Acquire))
    }

    pub fn is_claimed(&self) -> bool {
        self.winner().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_claim_wins() {
        let arbiter = CashoutArbiter::new();
        assert!(!arbiter.is_claimed());
        assert_eq!(arbiter.claim(Trigger::Manual), Ok(()));
        assert_eq!(arbiter.claim(Trigger::Automatic), Err(Trigger::Manual));
        assert_eq!(arbiter.claim(Trigger::Manual), Err(Trigger::Manual));
        assert_eq!(arbiter.winner(), Some(Trigger::Manual));
    }

    #[test]
    fn test_automatic_then_manual() {
        let arbiter = CashoutArbiter::new();
        assert_eq!(arbiter.claim(Trigger::Automatic), Ok(()));
        assert_eq!(arbiter.claim(Trigger::Manual), Err(Trigger::Automatic));
    }

    #[test]
    fn test_exactly_one_winner_across_threads() {
        for _ in 0..200 {
            let arbiter = Arc::new(CashoutArbiter::new());
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let arbiter = arbiter.clone();
                    let trigger = if i % 2 == 0 {
                        Trigger::Manual
                    } else {
                        Trigger::Automatic
                    };
                    std::thread::spawn(move || arbiter.claim(trigger).is_ok())
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
        }
    }
}

//! Rolling-window circuit breaker for external dependencies.
//!
//! The breaker watches recent call outcomes. When the failure rate inside
//! the window crosses the threshold it opens and rejects calls for a
//! cooldown period, then lets a single probe through; the probe's outcome
//! decides whether the circuit closes again or reopens.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// One probe call is in flight; everyone else is rejected.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_rate: f64,
    min_samples: usize,
    window: Duration,
    cooldown: Duration,
    state: CircuitState,
    /// Recent outcomes inside the window: (when, success).
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_rate: config.failure_rate,
            min_samples: config.min_samples,
            window: Duration::from_secs(config.window_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Ask permission to make a call.
    ///
    /// `Err` carries how long the caller should wait before the next try.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    Err(self.cooldown)
                } else {
                    self.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                // the probe came back healthy
                self.state = CircuitState::Closed;
                self.probe_in_flight = false;
                self.opened_at = None;
                self.outcomes.clear();
            }
            CircuitState::Closed => {
                self.push_outcome(true);
            }
            // a late result from before the circuit opened
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.probe_in_flight = false;
                self.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                self.push_outcome(false);
                if self.should_open() {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    self.outcomes.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn push_outcome(&mut self, success: bool) {
        self.outcomes.push_back((Instant::now(), success));
        self.prune();
    }

    fn prune(&mut self) {
        let Some(cutoff) = Instant::now().checked_sub(self.window) else {
            return;
        };
        while let Some((when, _)) = self.outcomes.front() {
            if *when < cutoff {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn should_open(&self) -> bool {
        if self.outcomes.len() < self.min_samples {
            return false;
        }
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.outcomes.len() as f64 >= self.failure_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_rate: f64, min_samples: usize, cooldown_ms: u64) -> CircuitBreaker {
        let mut b = CircuitBreaker::new(&BreakerConfig {
            failure_rate,
            min_samples,
            window_secs: 60,
            cooldown_secs: 1,
        });
        // tests want sub-second cooldowns
        b.cooldown = Duration::from_millis(cooldown_ms);
        b
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let mut b = breaker(0.5, 4, 50);
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn test_opens_at_failure_rate() {
        let mut b = breaker(0.5, 4, 50);
        b.record_success();
        b.record_success();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_stays_closed_below_min_samples() {
        let mut b = breaker(0.5, 5, 50);
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_with_wait_hint() {
        let mut b = breaker(1.0, 1, 200);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        let wait = b.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_millis(200));
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let mut b = breaker(1.0, 1, 20);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_probe_success_closes() {
        let mut b = breaker(1.0, 1, 20);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        b.try_acquire().unwrap();

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let mut b = breaker(1.0, 1, 20);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        b.try_acquire().unwrap();

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.try_acquire().is_err());
    }

    #[test]
    fn test_single_probe_at_a_time() {
        let mut b = breaker(1.0, 1, 20);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        assert!(b.try_acquire().is_ok());
        // a second caller must wait for the probe's verdict
        assert!(b.try_acquire().is_err());
    }

    #[test]
    fn test_window_prunes_old_outcomes() {
        let mut b = breaker(0.5, 2, 50);
        b.window = Duration::from_millis(20);

        b.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        // the earlier failure has aged out, so one more is below min_samples
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }
}

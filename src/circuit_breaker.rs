use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        // one failure takes a replica out of the rotation until the reset timeout
        Self {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout_ms: 5000,
        }
    }
}

/// Per-replica breaker, shared between concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_duration: Duration,
    state: Mutex<State>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_duration: Duration::from_millis(config.reset_timeout_ms),
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    // Moves Open -> HalfOpen once the open window has elapsed
    pub fn should_allow_call(&self) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Closed { .. } | State::HalfOpen { .. } => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.open_duration {
                    *state = State::HalfOpen { successes: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn success(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => *failures = 0,
            State::HalfOpen { successes } => {
                *successes += 1;
                if *successes >= self.success_threshold {
                    *state = State::Closed { failures: 0 };
                }
            }
            State::Open { .. } => {}
        }
    }

    pub fn fail(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            State::HalfOpen { .. } => {
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Forces the breaker closed. Returns true if it was not closed before.
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        let was_closed = matches!(*state, State::Closed { .. });
        *state = State::Closed { failures: 0 };
        !was_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(
        failure_threshold: u32,
        success_threshold: u32,
        reset_timeout_ms: u64,
    ) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            reset_timeout_ms,
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 1, 60_000);
        cb.fail();
        cb.fail();
        assert!(cb.is_closed());
        cb.fail();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.should_allow_call());
    }

    #[test]
    fn test_success_clears_failure_streak() {
        let cb = breaker(2, 1, 60_000);
        cb.fail();
        cb.success();
        cb.fail();
        assert!(cb.is_closed());
    }

    #[test]
    fn test_half_open_after_timeout_then_close() {
        let cb = breaker(1, 2, 10);
        cb.fail();
        assert!(!cb.should_allow_call());

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.should_allow_call());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.success();
        assert!(cb.is_closed());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 1, 10);
        cb.fail();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.should_allow_call());
        cb.fail();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, 1, 60_000);
        assert!(!cb.reset());
        cb.fail();
        assert!(cb.reset());
        assert!(cb.should_allow_call());
    }
}

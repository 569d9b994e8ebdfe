//! Circuit breaker guarding the embedding service
//!
//! Closed until `failure_threshold` consecutive failures, then open for a
//! fixed timeout. After the timeout one probe request is let through
//! (half-open); its outcome either closes the circuit or re-opens it.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{EmbeddingError, EmbeddingResult};

#[derive(Debug, Clone, Copy)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Consecutive-failure circuit breaker
pub struct CircuitBreaker {
    state: Mutex<State>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            open_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate a request. While open this fails fast; the first call after the
    /// open timeout becomes the half-open probe.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::CircuitOpen` when the request must not be
    /// attempted.
    pub fn check(&self) -> EmbeddingResult<()> {
        let mut state = self.lock();
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { since } => {
                if since.elapsed() >= self.open_timeout {
                    *state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(EmbeddingError::CircuitOpen)
                }
            }
            // A probe is already in flight.
            State::HalfOpen => Err(EmbeddingError::CircuitOpen),
        }
    }

    pub fn record_success(&self) {
        *self.lock() = State::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        match *state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures.saturating_add(1);
                if failures >= self.failure_threshold {
                    *state = State::Open {
                        since: Instant::now(),
                    };
                } else {
                    *state = State::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            State::HalfOpen => {
                *state = State::Open {
                    since: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    /// True when requests are currently rejected without the side effect of
    /// starting a probe
    #[must_use]
    pub fn is_open(&self) -> bool {
        match *self.lock() {
            State::Open { since } => since.elapsed() < self.open_timeout,
            State::Closed { .. } | State::HalfOpen => false,
        }
    }
}

//! Three-state circuit breaker (`spec.md` §4.I), shape grounded in the
//! `CircuitBreakerState`/`CircuitState` pair from the durable-store
//! reliability layer in the retrieved example pack: a tracked state plus
//! consecutive failure/success counters and timestamps, rather than a bare
//! enum. The breaker here is in-process (one per `QueueClient`), where the
//! example's version persists state across restarts — this client doesn't
//! need that durability, so the counters live in a `Mutex` instead of a
//! store-backed record.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is in flight, so concurrent callers don't
    /// all get treated as "the" probe.
    half_open_probe_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Check whether a call may proceed right now; transitions `Open` ->
    /// `HalfOpen` once the cooldown has elapsed. Returns the remaining
    /// cooldown if the call must be rejected.
    fn admit(&self) -> std::result::Result<(), Duration> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    // Another call is already probing; fail fast rather than
                    // letting a thundering herd all hit the half-open state.
                    Err(Duration::from_millis(0))
                } else {
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                }
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_probe_in_flight = false;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.half_open_probe_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = self.failure_threshold;
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run `f` through the breaker: fail fast while open, otherwise run it
    /// and record the outcome.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        if let Err(remaining) = self.admit() {
            return Err(ClientError::CircuitOpen {
                retry_after_ms: remaining.as_millis() as u64,
            });
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if e.counts_toward_circuit_breaker() {
                    self.on_failure();
                } else {
                    // A CircuitOpen error can't occur here since `admit`
                    // already returned Ok, but guard against any future
                    // non-counting variant leaving a half-open probe stuck.
                    self.inner.lock().unwrap().half_open_probe_in_flight = false;
                }
                Err(e)
            }
        }
    }
}

impl Default for CircuitBreaker {
    /// `spec.md` §4.I defaults: opens after 3 consecutive failures, 5s
    /// cooldown.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fail() -> Result<(), ClientError> {
        Err(ClientError::Api {
            status: 503,
            message: "down".into(),
        })
    }

    async fn succeed() -> Result<(), ClientError> {
        Ok(())
    }

    /// `spec.md` §8 scenario 6: 3 consecutive failures open the breaker.
    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));
        for _ in 0..3 {
            let _ = breaker.call(fail).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(succeed).await;
        assert!(matches!(result, Err(ClientError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_the_breaker() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(10));
        for _ in 0..3 {
            let _ = breaker.call(fail).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = breaker.call(succeed).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_the_breaker() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(10));
        for _ in 0..3 {
            let _ = breaker.call(fail).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = breaker.call(fail).await;
        assert!(result.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn a_single_failure_in_closed_state_does_not_open_it() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));
        let _ = breaker.call(fail).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

//! Resilience primitives: circuit breaker and watchdog
//!
//! The circuit breaker is the only retry/backoff mechanism in the loop;
//! planner and allocator logic never retry. The watchdog is fatal: a
//! tripped deadline means the loop itself has stalled.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use neuraxis_common::{NeuraxisError, ResilienceError, Result};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure-counting breaker around external collaborator calls.
///
/// Opens after `failure_threshold` consecutive failures, short-circuits
/// for `reset_timeout`, then half-closes and lets one trial call through.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    failures: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            failures: 0,
            opened_at: None,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_open(&self) -> bool {
        matches!(self.opened_at, Some(at) if at.elapsed() < self.reset_timeout)
    }

    pub async fn call<T, F>(&mut self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(opened_at) = self.opened_at {
            if opened_at.elapsed() < self.reset_timeout {
                return Err(NeuraxisError::Resilience(ResilienceError::BreakerOpen {
                    failures: self.failures,
                }));
            }
            // Half-open: allow one trial call through.
            self.opened_at = None;
            self.failures = 0;
        }

        match op.await {
            Ok(value) => {
                self.failures = 0;
                Ok(value)
            }
            Err(err) => {
                self.failures += 1;
                if self.failures >= self.failure_threshold {
                    warn!(failures = self.failures, "circuit breaker opened");
                    self.opened_at = Some(Instant::now());
                }
                Err(err)
            }
        }
    }
}

/// Per-cycle deadline. Reset at cycle start, checked at cycle end.
#[derive(Debug)]
pub struct WatchdogTimer {
    timeout: Duration,
    last_reset: Instant,
}

impl WatchdogTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_reset: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }

    pub fn check(&self) -> Result<()> {
        if self.last_reset.elapsed() > self.timeout {
            return Err(NeuraxisError::Resilience(ResilienceError::WatchdogTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing() -> Result<()> {
        Err(NeuraxisError::Sensory("boom".to_string()))
    }

    async fn succeeding() -> Result<u32> {
        Ok(42)
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(breaker.call(failing()).await.is_err());
        }
        assert!(breaker.is_open());

        let err = breaker.call(succeeding()).await.unwrap_err();
        assert!(matches!(
            err,
            NeuraxisError::Resilience(ResilienceError::BreakerOpen { failures: 3 })
        ));
    }

    #[tokio::test]
    async fn test_breaker_half_open_trial_resets_on_success() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_millis(10));
        for _ in 0..2 {
            let _ = breaker.call(failing()).await;
        }
        assert!(breaker.is_open());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.call(succeeding()).await.unwrap(), 42);
        assert_eq!(breaker.failures(), 0);
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn test_success_clears_failure_streak() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let _ = breaker.call(failing()).await;
        let _ = breaker.call(failing()).await;
        let _ = breaker.call(succeeding()).await;
        assert_eq!(breaker.failures(), 0);
    }

    #[tokio::test]
    async fn test_watchdog_trips_after_deadline() {
        let mut watchdog = WatchdogTimer::new(Duration::from_millis(10));
        watchdog.reset();
        assert!(watchdog.check().is_ok());

        tokio::time::sleep(Duration::from_millis(25)).await;
        let err = watchdog.check().unwrap_err();
        assert!(err.is_fatal());
    }
}

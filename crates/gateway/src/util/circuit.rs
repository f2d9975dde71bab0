// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker for external services.
//!
//! Closed until `max_failures` consecutive errors, then open for
//! `reset_timeout`; the first call after that runs half-open — success
//! closes the circuit, failure reopens it.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Returned while the circuit is open and the reset timeout has not elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit {0} is open")]
pub struct CircuitOpen(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failures: u32,
    last_failure_at: Option<Instant>,
}

/// Failure-counting breaker guarding one named dependency.
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limits(name, 3, Duration::from_secs(60))
    }

    pub fn with_limits(
        name: impl Into<String>,
        max_failures: u32,
        reset_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            max_failures,
            reset_timeout,
            inner: Mutex::new(Inner { state: State::Closed, failures: 0, last_failure_at: None }),
        }
    }

    /// Gate a call. `Err` while open; transitions open → half-open once the
    /// reset timeout has elapsed.
    pub fn check(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock();
        if inner.state != State::Open {
            return Ok(());
        }
        let elapsed = inner.last_failure_at.map(|at| at.elapsed()).unwrap_or(self.reset_timeout);
        if elapsed >= self.reset_timeout {
            info!(circuit = %self.name, "transitioning from OPEN to HALF_OPEN");
            inner.state = State::HalfOpen;
            Ok(())
        } else {
            warn!(circuit = %self.name, "rejecting call while open");
            Err(CircuitOpen(self.name.clone()))
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == State::HalfOpen {
            info!(circuit = %self.name, "recovered, closing circuit");
        }
        inner.state = State::Closed;
        inner.failures = 0;
        inner.last_failure_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            State::Closed if inner.failures >= self.max_failures => {
                warn!(circuit = %self.name, failures = inner.failures, "opening circuit");
                inner.state = State::Open;
            }
            State::HalfOpen => {
                warn!(circuit = %self.name, "probe failed, reopening circuit");
                inner.state = State::Open;
            }
            _ => {}
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == State::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_circuit_admits_calls() {
        let circuit = CircuitBreaker::new("wms");
        assert!(circuit.check().is_ok());
        circuit.record_failure();
        circuit.record_failure();
        assert!(circuit.check().is_ok());
        assert!(!circuit.is_open());
    }

    #[test]
    fn opens_after_max_failures_and_rejects() {
        let circuit = CircuitBreaker::with_limits("wms", 3, Duration::from_secs(60));
        for _ in 0..3 {
            circuit.record_failure();
        }
        assert!(circuit.is_open());
        assert_eq!(circuit.check(), Err(CircuitOpen("wms".to_string())));
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let circuit = CircuitBreaker::with_limits("wms", 1, Duration::from_millis(0));
        circuit.record_failure();
        assert!(circuit.is_open());

        // Zero reset timeout: the next check runs half-open.
        assert!(circuit.check().is_ok());
        circuit.record_success();
        assert!(!circuit.is_open());
        assert!(circuit.check().is_ok());
    }

    #[test]
    fn half_open_failure_reopens() {
        let circuit = CircuitBreaker::with_limits("wms", 1, Duration::from_millis(0));
        circuit.record_failure();
        assert!(circuit.check().is_ok()); // half-open probe
        circuit.record_failure();
        assert!(circuit.is_open());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let circuit = CircuitBreaker::with_limits("wms", 2, Duration::from_secs(60));
        circuit.record_failure();
        circuit.record_success();
        circuit.record_failure();
        assert!(!circuit.is_open());
    }
}

//! Circuit Breaker Implementation
//!
//! Guards backend instances and outbound HTTP forwarders so a failing
//! dependency fails fast instead of holding every request until its deadline.
//!
//! ## States:
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Circuit is open, requests fail fast without calling the dependency
//! - **HalfOpen**: Testing state, limited requests allowed to test if it recovered

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Circuit breaker specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    #[error("CircuitBreaker '{name}' is OPEN and does not permit further calls")]
    CircuitOpen { name: String },
}

/// Circuit breaker state machine
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    /// Circuit is closed, tracks consecutive failures
    Closed { failure_count: u32 },

    /// Circuit is open, records when it was opened
    Open { opened_at: Instant },

    /// Circuit is half-open, tracks trial calls and their successes.
    /// A half-open window older than `open_timeout` admits a fresh trial.
    HalfOpen {
        success_count: u32,
        in_flight: u32,
        since: Instant,
    },
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// How long to wait before transitioning from Open to HalfOpen
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,

    /// Number of successful requests needed in HalfOpen to close the circuit
    pub success_threshold: u32,

    /// Maximum number of trial requests allowed in HalfOpen state
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            success_threshold: 3,
            half_open_max_requests: 10,
        }
    }
}

/// Counters collected by the circuit breaker
#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub circuit_opened_count: AtomicU64,
}

pub struct CircuitBreaker {
    state: Mutex<CircuitBreakerState>,
    config: CircuitBreakerConfig,
    metrics: Arc<CircuitBreakerMetrics>,
    name: String,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            state: Mutex::new(CircuitBreakerState::Closed { failure_count: 0 }),
            config,
            metrics: Arc::new(CircuitBreakerMetrics::default()),
            name: name.into(),
        }
    }

    /// Check if a request can proceed through the circuit breaker
    pub fn can_proceed(&self) -> Result<(), CircuitBreakerError> {
        let mut state = self.state.lock();
        let now = Instant::now();

        match *state {
            CircuitBreakerState::Closed { .. } => Ok(()),
            CircuitBreakerState::Open { opened_at } => {
                if now.duration_since(opened_at) >= self.config.open_timeout {
                    debug!(breaker = %self.name, "circuit half-open");
                    *state = CircuitBreakerState::HalfOpen {
                        success_count: 0,
                        in_flight: 1,
                        since: now,
                    };
                    Ok(())
                } else {
                    self.metrics.rejected_requests.fetch_add(1, Ordering::Relaxed);
                    Err(self.open_error())
                }
            }
            CircuitBreakerState::HalfOpen {
                success_count,
                in_flight,
                since,
            } => {
                if in_flight < self.config.half_open_max_requests {
                    *state = CircuitBreakerState::HalfOpen {
                        success_count,
                        in_flight: in_flight + 1,
                        since,
                    };
                    Ok(())
                } else if now.duration_since(since) >= self.config.open_timeout {
                    warn!(breaker = %self.name, "half-open trial calls never completed, restarting trial");
                    *state = CircuitBreakerState::HalfOpen {
                        success_count: 0,
                        in_flight: 1,
                        since: now,
                    };
                    Ok(())
                } else {
                    self.metrics.rejected_requests.fetch_add(1, Ordering::Relaxed);
                    Err(self.open_error())
                }
            }
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        self.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);

        match *state {
            CircuitBreakerState::Closed { .. } => {
                *state = CircuitBreakerState::Closed { failure_count: 0 };
            }
            CircuitBreakerState::Open { .. } => {}
            CircuitBreakerState::HalfOpen {
                success_count,
                in_flight,
                since,
            } => {
                let success_count = success_count + 1;
                if success_count >= self.config.success_threshold {
                    debug!(breaker = %self.name, "circuit closed");
                    *state = CircuitBreakerState::Closed { failure_count: 0 };
                } else {
                    *state = CircuitBreakerState::HalfOpen {
                        success_count,
                        in_flight: in_flight.saturating_sub(1),
                        since,
                    };
                }
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);

        match *state {
            CircuitBreakerState::Closed { failure_count } => {
                let failure_count = failure_count + 1;
                if failure_count >= self.config.failure_threshold {
                    warn!(breaker = %self.name, failures = failure_count, "circuit opened");
                    *state = CircuitBreakerState::Open { opened_at: now };
                    self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    *state = CircuitBreakerState::Closed { failure_count };
                }
            }
            CircuitBreakerState::Open { .. } => {}
            CircuitBreakerState::HalfOpen { .. } => {
                warn!(breaker = %self.name, "trial call failed, circuit re-opened");
                *state = CircuitBreakerState::Open { opened_at: now };
                self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Run `operation` under the breaker. `is_failure` decides which errors
    /// count against the dependency; the rest count as successes.
    ///
    /// A call dropped before it completes (for example by an outer deadline)
    /// is recorded as a failure.
    pub async fn call<F, T, E>(&self, operation: F, is_failure: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<CircuitBreakerError>,
    {
        self.can_proceed()?;
        let mut permit = CallPermit {
            breaker: self,
            settled: false,
        };
        let result = operation.await;
        permit.settled = true;
        match &result {
            Err(err) if is_failure(err) => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state.lock().clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> Arc<CircuitBreakerMetrics> {
        Arc::clone(&self.metrics)
    }

    fn open_error(&self) -> CircuitBreakerError {
        CircuitBreakerError::CircuitOpen {
            name: self.name.clone(),
        }
    }
}

/// Admitted call; records a failure if dropped before its outcome is known
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(breaker = %self.breaker.name, "call cancelled before completion");
            self.breaker.record_failure();
        }
    }
}

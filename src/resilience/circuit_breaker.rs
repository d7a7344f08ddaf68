//! Circuit breaker for AI backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after open timeout elapses (checked lazily)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial request in Half-Open (prevents hammering recovering backend)
//! - Callers hold a `BreakerPermit` for the call; dropping it without an
//!   outcome counts as a failure, so a cancelled half-open call re-opens
//! - Each record lives in a DashMap entry, so transitions are locked read-modify-write

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;
use crate::error::{GuardError, GuardResult};
use crate::observability::metrics;

/// Breaker state for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Health bookkeeping for a single service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealthRecord {
    pub state: BreakerState,
    pub failure_count: u32,
    /// Unix millis until which the breaker stays open.
    pub open_until: Option<u64>,
    /// Whether the half-open trial call has been handed out.
    pub probe_in_flight: bool,
}

impl Default for ServiceHealthRecord {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            open_until: None,
            probe_in_flight: false,
        }
    }
}

/// Per-service circuit breaker registry.
#[derive(Debug)]
pub struct CircuitBreaker {
    records: DashMap<String, ServiceHealthRecord>,
    failure_threshold: u32,
    open_duration: Duration,
    clock: SharedClock,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            failure_threshold: config.failure_threshold.max(1),
            open_duration: Duration::from_secs(config.open_secs),
            clock,
        }
    }

    /// Fail fast if the service's breaker is open.
    ///
    /// Once the open timeout has elapsed the breaker moves to half-open and
    /// exactly one caller is let through as the trial call.
    pub fn check_availability(&self, service: &str) -> GuardResult<()> {
        let now = self.clock.now_millis();
        let mut record = self.records.entry(service.to_string()).or_default();
        let state = record.state;

        match state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let open_until = record.open_until.unwrap_or(now);
                if now < open_until {
                    return Err(GuardError::ServiceUnavailable {
                        service: service.to_string(),
                        retry_after_secs: (open_until - now).div_ceil(1000),
                    });
                }
                record.state = BreakerState::HalfOpen;
                record.probe_in_flight = true;
                tracing::info!(service = %service, "Circuit half-open, allowing trial request");
                metrics::record_breaker_transition(service, BreakerState::HalfOpen.as_str());
                Ok(())
            }
            BreakerState::HalfOpen => {
                if record.probe_in_flight {
                    tracing::debug!(service = %service, "Trial call already in flight, rejecting");
                    return Err(GuardError::ServiceUnavailable {
                        service: service.to_string(),
                        retry_after_secs: 1,
                    });
                }
                record.probe_in_flight = true;
                Ok(())
            }
        }
    }

    /// Admit one call and hand back a permit that records its outcome.
    pub fn admit(self: &Arc<Self>, service: &str) -> GuardResult<BreakerPermit> {
        self.check_availability(service)?;
        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            service: service.to_string(),
            armed: true,
        })
    }

    /// Report a successful call.
    pub fn record_success(&self, service: &str) {
        let mut record = self.records.entry(service.to_string()).or_default();
        record.failure_count = 0;

        if record.state == BreakerState::HalfOpen {
            record.state = BreakerState::Closed;
            record.open_until = None;
            record.probe_in_flight = false;
            tracing::info!(service = %service, "Trial call succeeded, circuit closed");
            metrics::record_breaker_transition(service, BreakerState::Closed.as_str());
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self, service: &str) {
        let now = self.clock.now_millis();
        let open_until = now + self.open_duration.as_millis() as u64;
        let mut record = self.records.entry(service.to_string()).or_default();
        record.failure_count = record.failure_count.saturating_add(1);
        let state = record.state;
        let failures = record.failure_count;

        match state {
            BreakerState::HalfOpen => {
                record.state = BreakerState::Open;
                record.open_until = Some(open_until);
                record.probe_in_flight = false;
                tracing::warn!(service = %service, "Trial call failed, circuit re-opened");
                metrics::record_breaker_transition(service, BreakerState::Open.as_str());
            }
            BreakerState::Closed if failures >= self.failure_threshold => {
                record.state = BreakerState::Open;
                record.open_until = Some(open_until);
                tracing::warn!(
                    service = %service,
                    failures = failures,
                    open_secs = self.open_duration.as_secs(),
                    "Failure threshold reached, circuit opened"
                );
                metrics::record_breaker_transition(service, BreakerState::Open.as_str());
            }
            _ => {
                tracing::debug!(service = %service, failures = failures, "Failure recorded");
            }
        }
    }

    /// Snapshot of every known service.
    pub fn status(&self) -> BTreeMap<String, ServiceHealthRecord> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Current state of one service (closed if never seen).
    pub fn state(&self, service: &str) -> BreakerState {
        self.records
            .get(service)
            .map(|r| r.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Forget all breaker state.
    pub fn reset_all(&self) {
        self.records.clear();
    }
}

/// RAII handle for an admitted call.
///
/// Exactly one outcome is recorded. Dropping an armed permit, as happens when
/// the call future is cancelled, records a failure.
#[derive(Debug)]
#[must_use = "dropping the permit records a failure"]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    service: String,
    armed: bool,
}

impl BreakerPermit {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn success(mut self) {
        self.armed = false;
        self.breaker.record_success(&self.service);
    }

    pub fn failure(mut self) {
        self.armed = false;
        self.breaker.record_failure(&self.service);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(service = %self.service, "Call abandoned before completion, recording failure");
            self.breaker.record_failure(&self.service);
        }
    }
}

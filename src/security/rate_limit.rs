//! Per-session rate limiting: fixed-window quotas, generation cooldown and
//! in-flight concurrency.
//!
//! Fixed windows are deliberate. A window resets wholesale once its duration
//! has elapsed since it started; callers rely on that coarse reset.
//!
//! `admit_generation` checks cooldown, API quota and concurrency before it
//! commits any of them, so a rejected generation leaves no trace. The
//! session's cooldown entry stays locked for the whole admission. Lock order
//! is `last_generation` → `concurrency` → `windows`, and no other path nests
//! these maps.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use crate::error::{GuardError, GuardResult};
use crate::observability::metrics;

/// The quota-governed resource a window counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ApiCall,
    FileProcessing,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ApiCall => write!(f, "api calls"),
            ResourceKind::FileProcessing => write!(f, "file processing"),
        }
    }
}

/// A fixed rate window.
#[derive(Debug, Clone)]
struct RateWindow {
    count: u32,
    window_start: u64,
    limit: u32,
    window_duration: u64,
}

impl RateWindow {
    fn new(limit: u32, window_duration: Duration, now: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
            limit,
            window_duration: window_duration.as_millis() as u64,
        }
    }

    fn roll(&mut self, now: u64) {
        if now.saturating_sub(self.window_start) >= self.window_duration {
            self.count = 0;
            self.window_start = now;
        }
    }

    /// Count one use. Returns the millis until reset when the limit is hit.
    fn try_acquire(&mut self, now: u64) -> Result<(), u64> {
        self.roll(now);
        if self.count >= self.limit {
            return Err(self.resets_in(now));
        }
        self.count += 1;
        Ok(())
    }

    fn resets_in(&self, now: u64) -> u64 {
        (self.window_start + self.window_duration).saturating_sub(now)
    }
}

#[derive(Debug, Clone, Copy)]
struct ConcurrencyCounter {
    current: u32,
    max: u32,
}

/// Quota usage for one resource kind.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WindowStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub resets_in_secs: u64,
}

/// Snapshot of one session's rate limiting state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub api_calls: WindowStatus,
    pub file_processing: WindowStatus,
    pub concurrent: u32,
    pub max_concurrent: u32,
    pub cooldown_remaining_ms: u64,
}

/// Per-session rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(String, ResourceKind), RateWindow>,
    concurrency: DashMap<String, ConcurrencyCounter>,
    last_generation: DashMap<String, u64>,
    config: RateLimitConfig,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            windows: DashMap::new(),
            concurrency: DashMap::new(),
            last_generation: DashMap::new(),
            config,
            clock,
        }
    }

    fn limit_for(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::ApiCall => self.config.api_calls_per_window,
            ResourceKind::FileProcessing => self.config.file_ops_per_window,
        }
    }

    fn window_duration(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    fn record(&self, session: &str, kind: ResourceKind) -> GuardResult<()> {
        let now = self.clock.now_millis();
        let limit = self.limit_for(kind);
        let mut window = self
            .windows
            .entry((session.to_string(), kind))
            .or_insert_with(|| RateWindow::new(limit, self.window_duration(), now));

        window
            .try_acquire(now)
            .map_err(|resets_in_ms| self.quota_rejected(session, kind, resets_in_ms))
    }

    /// Fail if the next use of `kind` would exceed the quota. Counts nothing.
    fn check_quota(&self, session: &str, kind: ResourceKind, now: u64) -> GuardResult<()> {
        let Some(window) = self.windows.get(&(session.to_string(), kind)) else {
            return Ok(());
        };
        let mut window = window.clone();
        window.roll(now);
        if window.count >= window.limit {
            return Err(self.quota_rejected(session, kind, window.resets_in(now)));
        }
        Ok(())
    }

    fn quota_rejected(&self, session: &str, kind: ResourceKind, resets_in_ms: u64) -> GuardError {
        let limit = self.limit_for(kind);
        tracing::warn!(session = %session, kind = %kind, limit = limit, "Rate limit exceeded");
        metrics::record_rate_limited(match kind {
            ResourceKind::ApiCall => "api_quota",
            ResourceKind::FileProcessing => "file_quota",
        });
        GuardError::QuotaExceeded {
            kind,
            limit,
            retry_after_secs: resets_in_ms.div_ceil(1000),
        }
    }

    /// Fail while the cooldown since `last` is still running.
    fn check_cooldown(&self, session: &str, last: u64, now: u64) -> GuardResult<()> {
        let cooldown = self.config.generation_cooldown_secs * 1000;
        let elapsed = now.saturating_sub(last);
        if elapsed < cooldown {
            let remaining_ms = cooldown - elapsed;
            tracing::warn!(session = %session, remaining_ms = remaining_ms, "Generation cooldown active");
            metrics::record_rate_limited("cooldown");
            return Err(GuardError::CooldownActive { remaining_ms });
        }
        Ok(())
    }

    /// Count one outbound API call against the session's quota.
    pub fn record_api_call(&self, session: &str) -> GuardResult<()> {
        self.record(session, ResourceKind::ApiCall)
    }

    /// Count one file-processing operation against the session's quota.
    pub fn record_file_processing(&self, session: &str) -> GuardResult<()> {
        self.record(session, ResourceKind::FileProcessing)
    }

    /// Enforce the cooldown between generation requests.
    ///
    /// A rejected call leaves the last recorded time untouched.
    pub fn record_quiz_generation(&self, session: &str) -> GuardResult<()> {
        let now = self.clock.now_millis();
        match self.last_generation.entry(session.to_string()) {
            Entry::Occupied(mut last) => {
                self.check_cooldown(session, *last.get(), now)?;
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        Ok(())
    }

    /// Admit one quiz generation: cooldown, then API quota, then a slot.
    ///
    /// Nothing is committed unless all three pass. On success the cooldown
    /// is stamped, one API call is counted and the returned slot is held.
    pub fn admit_generation(self: &Arc<Self>, session: &str) -> GuardResult<ConcurrencySlot> {
        let now = self.clock.now_millis();
        let entry = self.last_generation.entry(session.to_string());
        if let Entry::Occupied(last) = &entry {
            self.check_cooldown(session, *last.get(), now)?;
        }
        self.check_quota(session, ResourceKind::ApiCall, now)?;

        let slot = self.acquire_slot(session)?;
        // Only a direct record_api_call racing this admission can fail here.
        self.record(session, ResourceKind::ApiCall)?;
        entry.insert(now);
        Ok(slot)
    }

    /// Take one in-flight slot.
    pub fn increment_concurrent(&self, session: &str) -> GuardResult<()> {
        let max = self.config.max_concurrent;
        let mut counter = self
            .concurrency
            .entry(session.to_string())
            .or_insert(ConcurrencyCounter { current: 0, max });

        if counter.current >= counter.max {
            tracing::warn!(session = %session, max = counter.max, "Concurrency limit reached");
            metrics::record_rate_limited("concurrency");
            return Err(GuardError::ConcurrencyLimitExceeded { max: counter.max });
        }
        counter.current += 1;
        Ok(())
    }

    /// Release one in-flight slot. Floors at zero.
    pub fn decrement_concurrent(&self, session: &str) {
        if let Some(mut counter) = self.concurrency.get_mut(session) {
            counter.current = counter.current.saturating_sub(1);
        }
    }

    /// Take an in-flight slot that is released when the guard drops.
    pub fn acquire_slot(self: &Arc<Self>, session: &str) -> GuardResult<ConcurrencySlot> {
        self.increment_concurrent(session)?;
        Ok(ConcurrencySlot {
            limiter: self.clone(),
            session: session.to_string(),
        })
    }

    /// Snapshot of one session.
    pub fn status(&self, session: &str) -> RateLimitStatus {
        let now = self.clock.now_millis();
        let window_status = |kind: ResourceKind| {
            let limit = self.limit_for(kind);
            match self.windows.get(&(session.to_string(), kind)) {
                Some(w) => {
                    let mut w = w.clone();
                    w.roll(now);
                    WindowStatus {
                        used: w.count,
                        limit: w.limit,
                        remaining: w.limit.saturating_sub(w.count),
                        resets_in_secs: w.resets_in(now).div_ceil(1000),
                    }
                }
                None => WindowStatus {
                    used: 0,
                    limit,
                    remaining: limit,
                    resets_in_secs: 0,
                },
            }
        };

        let concurrent = self.concurrency.get(session).map(|c| c.current).unwrap_or(0);
        let cooldown = self.config.generation_cooldown_secs * 1000;
        let cooldown_remaining_ms = self
            .last_generation
            .get(session)
            .map(|last| cooldown.saturating_sub(now.saturating_sub(*last)))
            .unwrap_or(0);

        RateLimitStatus {
            api_calls: window_status(ResourceKind::ApiCall),
            file_processing: window_status(ResourceKind::FileProcessing),
            concurrent,
            max_concurrent: self.config.max_concurrent,
            cooldown_remaining_ms,
        }
    }

    /// Forget all sessions.
    pub fn reset_all(&self) {
        self.windows.clear();
        self.concurrency.clear();
        self.last_generation.clear();
    }
}

/// A RAII guard that holds one in-flight slot.
#[derive(Debug)]
pub struct ConcurrencySlot {
    limiter: Arc<RateLimiter>,
    session: String,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.limiter.decrement_concurrent(&self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (Arc<RateLimiter>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let limiter = RateLimiter::new(RateLimitConfig::default(), Arc::new(clock.clone()));
        (Arc::new(limiter), clock)
    }

    #[test]
    fn test_api_quota_and_window_reset() {
        let (rl, clock) = limiter();
        for _ in 0..20 {
            rl.record_api_call("s1").unwrap();
        }
        let err = rl.record_api_call("s1").unwrap_err();
        assert!(matches!(err, GuardError::QuotaExceeded { kind: ResourceKind::ApiCall, limit: 20, .. }));

        clock.advance(Duration::from_secs(3600));
        rl.record_api_call("s1").unwrap();
        assert_eq!(rl.status("s1").api_calls.used, 1);
    }

    #[test]
    fn test_quotas_are_per_session_and_kind() {
        let (rl, _clock) = limiter();
        for _ in 0..20 {
            rl.record_file_processing("s1").unwrap();
        }
        assert!(rl.record_file_processing("s1").is_err());
        assert!(rl.record_api_call("s1").is_ok());
        assert!(rl.record_file_processing("s2").is_ok());
    }

    #[test]
    fn test_cooldown_remaining_decreases() {
        let (rl, clock) = limiter();
        rl.record_quiz_generation("s1").unwrap();

        let mut previous = u64::MAX;
        for _ in 0..5 {
            clock.advance(Duration::from_secs(1));
            match rl.record_quiz_generation("s1") {
                Err(GuardError::CooldownActive { remaining_ms }) => {
                    assert!(remaining_ms < previous);
                    previous = remaining_ms;
                }
                other => panic!("expected cooldown, got {:?}", other),
            }
        }

        clock.advance(Duration::from_secs(5));
        assert!(rl.record_quiz_generation("s1").is_ok());
    }

    #[test]
    fn test_concurrency_bound() {
        let (rl, _clock) = limiter();
        for _ in 0..3 {
            rl.increment_concurrent("s1").unwrap();
        }
        assert!(matches!(
            rl.increment_concurrent("s1"),
            Err(GuardError::ConcurrencyLimitExceeded { max: 3 })
        ));
        rl.decrement_concurrent("s1");
        assert!(rl.increment_concurrent("s1").is_ok());
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let (rl, _clock) = limiter();
        rl.decrement_concurrent("unknown");
        rl.increment_concurrent("s1").unwrap();
        rl.decrement_concurrent("s1");
        rl.decrement_concurrent("s1");
        assert_eq!(rl.status("s1").concurrent, 0);
    }

    #[test]
    fn test_slot_released_on_drop() {
        let (rl, _clock) = limiter();
        {
            let _a = rl.acquire_slot("s1").unwrap();
            let _b = rl.acquire_slot("s1").unwrap();
            let _c = rl.acquire_slot("s1").unwrap();
            assert!(rl.acquire_slot("s1").is_err());
            assert_eq!(rl.status("s1").concurrent, 3);
        }
        assert_eq!(rl.status("s1").concurrent, 0);
    }

    #[test]
    fn test_status_and_reset() {
        let (rl, _clock) = limiter();
        rl.record_api_call("s1").unwrap();
        rl.record_quiz_generation("s1").unwrap();

        let status = rl.status("s1");
        assert_eq!(status.api_calls.remaining, 19);
        assert_eq!(status.file_processing.used, 0);
        assert_eq!(status.cooldown_remaining_ms, 10_000);

        rl.reset_all();
        let status = rl.status("s1");
        assert_eq!(status.api_calls.used, 0);
        assert_eq!(status.cooldown_remaining_ms, 0);
    }

    fn tight_limiter(max_concurrent: u32, api_calls: u32) -> (Arc<RateLimiter>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let config = RateLimitConfig {
            max_concurrent,
            api_calls_per_window: api_calls,
            ..RateLimitConfig::default()
        };
        (Arc::new(RateLimiter::new(config, Arc::new(clock.clone()))), clock)
    }

    #[test]
    fn test_admit_generation_commits_all_three() {
        let (rl, _clock) = limiter();
        let slot = rl.admit_generation("s1").unwrap();

        let status = rl.status("s1");
        assert_eq!(status.api_calls.used, 1);
        assert_eq!(status.concurrent, 1);
        assert_eq!(status.cooldown_remaining_ms, 10_000);

        drop(slot);
        assert_eq!(rl.status("s1").concurrent, 0);
    }

    #[test]
    fn test_concurrency_rejection_leaves_no_trace() {
        let (rl, _clock) = tight_limiter(1, 20);
        let _held = rl.acquire_slot("s1").unwrap();

        assert!(matches!(
            rl.admit_generation("s1"),
            Err(GuardError::ConcurrencyLimitExceeded { max: 1 })
        ));
        let status = rl.status("s1");
        assert_eq!(status.api_calls.used, 0);
        assert_eq!(status.cooldown_remaining_ms, 0);
        assert_eq!(status.concurrent, 1);
    }

    #[test]
    fn test_quota_rejection_does_not_stamp_cooldown() {
        let (rl, clock) = tight_limiter(3, 1);
        drop(rl.admit_generation("s1").unwrap());
        clock.advance(Duration::from_secs(10));

        assert!(matches!(
            rl.admit_generation("s1"),
            Err(GuardError::QuotaExceeded { kind: ResourceKind::ApiCall, limit: 1, .. })
        ));
        let status = rl.status("s1");
        assert_eq!(status.cooldown_remaining_ms, 0);
        assert_eq!(status.api_calls.used, 1);
        assert_eq!(status.concurrent, 0);
    }

    #[test]
    fn test_cooldown_rejection_consumes_nothing() {
        let (rl, clock) = limiter();
        drop(rl.admit_generation("s1").unwrap());
        clock.advance(Duration::from_secs(4));

        assert!(matches!(
            rl.admit_generation("s1"),
            Err(GuardError::CooldownActive { remaining_ms: 6000 })
        ));
        let status = rl.status("s1");
        assert_eq!(status.api_calls.used, 1);
        assert_eq!(status.cooldown_remaining_ms, 6000);
    }
}

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};


/// Circuit breaker states.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive failures that trip CLOSED into OPEN.
    pub failure_threshold: u32,
    /// Time OPEN refuses executions before probing recovery.
    pub cooldown: Duration,
    /// Probe budget in HALF_OPEN.
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown: Duration::from_millis(300_000),
            half_open_max_attempts: 1,
        }
    }
}

/// One state transition, emitted to the callback and (when wired) the
/// circuit-breaker event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub previous_state: BreakerState,
    pub new_state: BreakerState,
    pub reason: String,
    pub consecutive_failures: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Cumulative breaker metrics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerMetrics {
    pub times_tripped: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_open_ms: u64,
}

type TransitionCallback = Box<dyn Fn(TransitionEvent) + Send + Sync>;

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    half_open_attempts_used: u32,
    last_state_change: DateTime<Utc>,
    metrics: BreakerMetrics,
}

/// Three-state guard in front of strategy execution.
///
/// State reads are cheap; transitions are serialised under one mutex.
/// `can_execute` must be called before the protected section: a passing
/// call in HALF_OPEN consumes one probe slot. When disabled, the breaker
/// approves everything but keeps counting outcomes.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    on_transition: RwLock<Option<TransitionCallback>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("enabled", &self.config.enabled)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_attempts_used: 0,
                last_state_change: Utc::now(),
                metrics: BreakerMetrics::default(),
            }),
            on_transition: RwLock::new(None),
        }
    }

    /// Registers the transition callback. One callback per breaker; the
    /// service fans out from there.
    pub fn set_on_transition(&self, callback: TransitionCallback) {
        *self.on_transition.write() = Some(callback);
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn metrics(&self) -> BreakerMetrics {
        self.inner.lock().metrics
    }

    /// Gate check. Must precede the protected call.
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }
        let event = {
            let mut inner = self.inner.lock();
            match inner.state {
                BreakerState::Closed => return true,
                BreakerState::Open => {
                    let opened_at = inner.opened_at.unwrap_or(now);
                    if now.signed_duration_since(opened_at).num_milliseconds()
                        < self.config.cooldown.as_millis() as i64
                    {
                        return false;
                    }
                    // Cooldown elapsed: this call both transitions to
                    // HALF_OPEN and consumes the first probe slot.
                    inner.half_open_attempts_used = 1;
                    Some(Self::transition(
                        &mut inner,
                        BreakerState::HalfOpen,
                        "cooldown elapsed, probing recovery",
                        now,
                    ))
                }
                BreakerState::HalfOpen => {
                    if inner.half_open_attempts_used < self.config.half_open_max_attempts {
                        inner.half_open_attempts_used += 1;
                        return true;
                    }
                    return false;
                }
            }
        };
        self.emit(event);
        true
    }

    pub fn record_success(&self, now: DateTime<Utc>) {
        let event = {
            let mut inner = self.inner.lock();
            inner.metrics.total_successes += 1;
            inner.consecutive_failures = 0;
            match inner.state {
                BreakerState::HalfOpen => Some(Self::transition(
                    &mut inner,
                    BreakerState::Closed,
                    "probe succeeded",
                    now,
                )),
                _ => None,
            }
        };
        self.emit(event);
    }

    pub fn record_failure(&self, now: DateTime<Utc>) {
        let event = {
            let mut inner = self.inner.lock();
            inner.metrics.total_failures += 1;
            inner.consecutive_failures += 1;
            match inner.state {
                BreakerState::Closed
                    if self.config.enabled
                        && inner.consecutive_failures >= self.config.failure_threshold =>
                {
                    inner.metrics.times_tripped += 1;
                    Some(Self::transition(
                        &mut inner,
                        BreakerState::Open,
                        "consecutive failure threshold reached",
                        now,
                    ))
                }
                BreakerState::HalfOpen if self.config.enabled => {
                    inner.metrics.times_tripped += 1;
                    Some(Self::transition(
                        &mut inner,
                        BreakerState::Open,
                        "probe failed",
                        now,
                    ))
                }
                _ => None,
            }
        };
        self.emit(event);
    }

    /// Manual override: open regardless of counters.
    pub fn force_open(&self, reason: &str, now: DateTime<Utc>) {
        let event = {
            let mut inner = self.inner.lock();
            if inner.state == BreakerState::Open {
                None
            } else {
                inner.metrics.times_tripped += 1;
                Some(Self::transition(
                    &mut inner,
                    BreakerState::Open,
                    &format!("forced open: {reason}"),
                    now,
                ))
            }
        };
        if event.is_some() {
            warn!(reason, "circuit breaker forced open");
        }
        self.emit(event);
    }

    /// Manual override: close and reset counters.
    pub fn force_close(&self, now: DateTime<Utc>) {
        let event = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures = 0;
            if inner.state == BreakerState::Closed {
                None
            } else {
                Some(Self::transition(
                    &mut inner,
                    BreakerState::Closed,
                    "forced close",
                    now,
                ))
            }
        };
        self.emit(event);
    }

    fn transition(
        inner: &mut BreakerInner,
        next: BreakerState,
        reason: &str,
        now: DateTime<Utc>,
    ) -> TransitionEvent {
        let previous = inner.state;
        if previous == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at.take() {
                inner.metrics.total_open_ms +=
                    now.signed_duration_since(opened_at).num_milliseconds().max(0) as u64;
            }
        }
        match next {
            BreakerState::Open => inner.opened_at = Some(now),
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.half_open_attempts_used = 0;
            }
            BreakerState::HalfOpen => {}
        }
        inner.state = next;
        inner.last_state_change = now;
        info!(previous = ?previous, next = ?next, reason, "circuit breaker transition");
        TransitionEvent {
            previous_state: previous,
            new_state: next,
            reason: reason.to_string(),
            consecutive_failures: inner.consecutive_failures,
            timestamp: now,
        }
    }

    fn emit(&self, event: Option<TransitionEvent>) {
        if let Some(event) = event {
            if let Some(callback) = self.on_transition.read().as_ref() {
                callback(event);
            }
        }
    }
}

//! Circuit breaker guarding the email provider
//!
//! Each named resource gets a breaker that watches a sliding window of recent
//! outcomes and stops sends while the provider is failing.
//!
//! # States
//!
//! - **Closed**: Normal operation, every send is allowed
//! - **Open**: Failure rate crossed the threshold, sends are refused until the
//!   wait duration has elapsed
//! - **Half-Open**: A limited number of probe sends are allowed
//!
//! ```text
//! ┌─────────┐  failure rate >= threshold  ┌──────┐
//! │ Closed  │ ──────────────────────────> │ Open │ <──────┐
//! └─────────┘                             └──────┘        │
//!     ^                                      │            │
//!     │                                      │ wait       │ any failure
//!     │ `half_open_permits` successes        v elapsed    │
//!     │                              ┌───────────────┐    │
//!     └───────────────────────────── │  Half-Open    │ ───┘
//!                                    └───────────────┘
//! ```
//!
//! The window is a ring of the last `sliding_window_size` outcomes. The
//! failure rate is only evaluated once it holds at least `minimum_calls`
//! outcomes.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use herald_common::tracing;
use serde::{Deserialize, Serialize};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure rate (percent) at or above which the circuit opens
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Number of recent outcomes kept in the window
    #[serde(default = "default_sliding_window_size")]
    pub sliding_window_size: usize,

    /// Outcomes required in the window before the rate is evaluated
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: usize,

    /// How long the circuit stays open before probing (milliseconds)
    #[serde(default = "default_wait_duration_ms")]
    pub wait_duration_ms: u64,

    /// Probe sends allowed while half-open, and successes needed to close
    #[serde(default = "default_half_open_permits")]
    pub half_open_permits: u32,

    /// Per-resource overrides, keyed by breaker name
    #[serde(default)]
    pub overrides: ahash::AHashMap<String, CircuitBreakerOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            sliding_window_size: default_sliding_window_size(),
            minimum_calls: default_minimum_calls(),
            wait_duration_ms: default_wait_duration_ms(),
            half_open_permits: default_half_open_permits(),
            overrides: ahash::AHashMap::default(),
        }
    }
}

const fn default_failure_rate_threshold() -> f64 {
    50.0
}

const fn default_sliding_window_size() -> usize {
    10
}

const fn default_minimum_calls() -> usize {
    5
}

const fn default_wait_duration_ms() -> u64 {
    30_000
}

const fn default_half_open_permits() -> u32 {
    3
}

/// Per-resource override; unset fields fall back to the global value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerOverride {
    #[serde(default)]
    pub failure_rate_threshold: Option<f64>,
    #[serde(default)]
    pub sliding_window_size: Option<usize>,
    #[serde(default)]
    pub minimum_calls: Option<usize>,
    #[serde(default)]
    pub wait_duration_ms: Option<u64>,
    #[serde(default)]
    pub half_open_permits: Option<u32>,
}

/// Effective settings of a single breaker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSettings {
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub wait_duration: Duration,
    pub half_open_permits: u32,
}

impl CircuitBreakerConfig {
    /// Resolve the settings for `name`, applying any override.
    #[must_use]
    pub fn settings_for(&self, name: &str) -> BreakerSettings {
        let o = self.overrides.get(name).cloned().unwrap_or_default();

        let sliding_window_size = o
            .sliding_window_size
            .unwrap_or(self.sliding_window_size)
            .max(1);

        BreakerSettings {
            failure_rate_threshold: o
                .failure_rate_threshold
                .unwrap_or(self.failure_rate_threshold),
            sliding_window_size,
            minimum_calls: o
                .minimum_calls
                .unwrap_or(self.minimum_calls)
                .clamp(1, sliding_window_size),
            wait_duration: Duration::from_millis(
                o.wait_duration_ms.unwrap_or(self.wait_duration_ms),
            ),
            half_open_permits: o
                .half_open_permits
                .unwrap_or(self.half_open_permits)
                .max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    /// `true` marks a failure
    window: VecDeque<bool>,
    failures: usize,
    opened_at: Option<Instant>,
    permits_issued: u32,
    probe_successes: u32,
    /// Bumped on every state change; permits from an older generation are stale
    generation: u64,
}

impl BreakerData {
    fn new(settings: &BreakerSettings) -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::with_capacity(settings.sliding_window_size),
            failures: 0,
            opened_at: None,
            permits_issued: 0,
            probe_successes: 0,
            generation: 0,
        }
    }

    fn push(&mut self, failed: bool, capacity: usize) {
        if self.window.len() == capacity
            && let Some(evicted) = self.window.pop_front()
            && evicted
        {
            self.failures -= 1;
        }

        self.window.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.failures as f64 * 100.0 / self.window.len() as f64
        }
    }

    fn clear_window(&mut self) {
        self.window.clear();
        self.failures = 0;
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.generation += 1;
        self.opened_at = Some(Instant::now());
        self.permits_issued = 0;
        self.probe_successes = 0;
        self.clear_window();
    }
}

/// A three-state breaker for one named resource.
///
/// All state lives behind a single lock so a window update and the rate check
/// that follows it are atomic with respect to other workers.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    data: parking_lot::Mutex<BreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            data: parking_lot::Mutex::new(BreakerData::new(&settings)),
            settings,
        }
    }

    /// A breaker using the global settings from `config`.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        let name = name.into();
        let settings = config.settings_for(&name);
        Self::new(name, settings)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Whether a send may proceed right now.
    ///
    /// While half-open each `true` consumes one probe permit. Use
    /// [`Self::try_acquire`] when the outcome of that send will be reported.
    pub fn allow(&self) -> bool {
        self.try_acquire().is_some()
    }

    /// Admit one send, returning the permit its outcome must be recorded on.
    ///
    /// Returns `None` while open, or while half-open with every probe handed
    /// out.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut data = self.data.lock();

        let granted = match data.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = data
                    .opened_at
                    .is_none_or(|opened_at| opened_at.elapsed() >= self.settings.wait_duration);

                if elapsed {
                    data.state = CircuitState::HalfOpen;
                    data.generation += 1;
                    data.permits_issued = 1;
                    data.probe_successes = 0;
                    tracing::info!(
                        breaker = %self.name,
                        permits = self.settings.half_open_permits,
                        "Circuit breaker entering HALF-OPEN state - probing provider"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if data.permits_issued < self.settings.half_open_permits {
                    data.permits_issued += 1;
                    true
                } else {
                    false
                }
            }
        };

        granted.then(|| Permit {
            breaker: self,
            generation: data.generation,
        })
    }

    /// Record a success observed without a permit.
    ///
    /// Only the closed window takes these; half-open probes report through
    /// their [`Permit`].
    pub fn record_success(&self) -> bool {
        let mut data = self.data.lock();
        if data.state == CircuitState::Closed {
            self.on_success(&mut data)
        } else {
            self.ignore(data.state, false);
            false
        }
    }

    /// Record a failure observed without a permit.
    ///
    /// Returns `true` if the circuit transitioned to Open.
    pub fn record_failure(&self) -> bool {
        let mut data = self.data.lock();
        if data.state == CircuitState::Closed {
            self.on_failure(&mut data)
        } else {
            self.ignore(data.state, true);
            false
        }
    }

    fn settle(&self, generation: u64, failed: bool) -> bool {
        let mut data = self.data.lock();

        if data.generation != generation {
            tracing::debug!(
                breaker = %self.name,
                failed,
                "Ignoring outcome admitted under an earlier circuit state"
            );
            return false;
        }

        if failed {
            self.on_failure(&mut data)
        } else {
            self.on_success(&mut data)
        }
    }

    fn ignore(&self, state: CircuitState, failed: bool) {
        tracing::debug!(
            breaker = %self.name,
            ?state,
            failed,
            "Ignoring outcome recorded without a permit"
        );
    }

    fn on_success(&self, data: &mut BreakerData) -> bool {
        match data.state {
            CircuitState::Closed => {
                data.push(false, self.settings.sliding_window_size);
                false
            }
            CircuitState::HalfOpen => {
                data.probe_successes += 1;

                if data.probe_successes >= self.settings.half_open_permits {
                    data.state = CircuitState::Closed;
                    data.generation += 1;
                    data.opened_at = None;
                    data.permits_issued = 0;
                    data.probe_successes = 0;
                    data.clear_window();
                    tracing::info!(
                        breaker = %self.name,
                        "Circuit breaker CLOSED - normal operation resumed"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    fn on_failure(&self, data: &mut BreakerData) -> bool {
        match data.state {
            CircuitState::Closed => {
                data.push(true, self.settings.sliding_window_size);

                let calls = data.window.len();
                let rate = data.failure_rate();

                if calls >= self.settings.minimum_calls
                    && rate >= self.settings.failure_rate_threshold
                {
                    data.trip();
                    tracing::warn!(
                        breaker = %self.name,
                        calls,
                        failure_rate = rate,
                        threshold = self.settings.failure_rate_threshold,
                        wait_ms = u64::try_from(self.settings.wait_duration.as_millis()).unwrap_or(u64::MAX),
                        "Circuit breaker OPENED - refusing sends to protect provider"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                data.trip();
                tracing::warn!(
                    breaker = %self.name,
                    "Circuit breaker probe failed - reopening circuit"
                );
                true
            }
            CircuitState::Open => false,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.data.lock().state
    }

    /// Whether the circuit is open and still within its wait duration.
    ///
    /// Unlike [`Self::allow`] this never changes state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let data = self.data.lock();
        data.state == CircuitState::Open
            && data
                .opened_at
                .is_some_and(|opened_at| opened_at.elapsed() < self.settings.wait_duration)
    }

    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.lock();
        CircuitBreakerStats {
            state: data.state,
            calls: data.window.len(),
            failures: data.failures,
            failure_rate: data.failure_rate(),
            probe_successes: data.probe_successes,
            permits_remaining: match data.state {
                CircuitState::HalfOpen => self
                    .settings
                    .half_open_permits
                    .saturating_sub(data.permits_issued),
                CircuitState::Closed | CircuitState::Open => 0,
            },
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// Outcomes currently in the window
    pub calls: usize,
    pub failures: usize,
    /// Percentage of failures in the window
    pub failure_rate: f64,
    pub probe_successes: u32,
    pub permits_remaining: u32,
}

/// Admission for one send, tied to the circuit state that granted it.
///
/// An outcome recorded after the breaker has moved on (tripped, started
/// probing, or closed again) is dropped, so only probes decide a half-open
/// circuit.
#[derive(Debug)]
#[must_use = "the outcome of the admitted send should be recorded"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
}

impl Permit<'_> {
    /// Returns `true` if the circuit transitioned to Closed.
    pub fn record_success(self) -> bool {
        self.breaker.settle(self.generation, false)
    }

    /// Returns `true` if the circuit transitioned to Open.
    pub fn record_failure(self) -> bool {
        self.breaker.settle(self.generation, true)
    }
}

/// Hands out one shared breaker per resource name
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for `name`
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_config(name, &self.config)))
            .clone()
    }

    /// Statistics for every breaker created so far, sorted by name
    #[must_use]
    pub fn stats(&self) -> Vec<(String, CircuitBreakerStats)> {
        let mut stats = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect::<Vec<_>>();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}

//! Circuit breaker guarding exchange connection attempts.
//!
//! Three-state machine:
//!
//! ```text
//! Closed{n} ──n reaches failure_threshold──► Open{n, opened_at}
//! Open      ──can_attempt() after timeout──► HalfOpen{n, 0}
//! HalfOpen  ──any failure──────────────────► Open{n+1, now}
//! HalfOpen  ──success_threshold successes──► Closed{0}
//! ```
//!
//! The cooldown is evaluated lazily inside [`CircuitBreaker::can_attempt`];
//! nothing runs in the background. The breaker never fails; callers decide
//! what to do with a `false` from `can_attempt` (see `xarb_md::guard`).

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ArbitrageError;
use crate::time_util::{InstantClock, system_instant_clock};

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures (while closed) that trip the breaker.
    pub failure_threshold: u32,
    /// Cooldown before an open breaker allows a probe.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ArbitrageError> {
        if self.failure_threshold == 0 {
            return Err(ArbitrageError::InvalidConfiguration(
                "circuit_breaker.failure_threshold must be >= 1".into(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ArbitrageError::InvalidConfiguration(
                "circuit_breaker.success_threshold must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Snapshot of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed { failure_count: u32 },
    Open { failure_count: u32, opened_at: Instant },
    HalfOpen { failure_count: u32, success_count: u32 },
}

impl CircuitState {
    /// Failure count, regardless of variant.
    pub fn failure_count(&self) -> u32 {
        match *self {
            Self::Closed { failure_count }
            | Self::Open { failure_count, .. }
            | Self::HalfOpen { failure_count, .. } => failure_count,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed { failure_count } => write!(f, "closed(failures={failure_count})"),
            Self::Open { failure_count, .. } => write!(f, "open(failures={failure_count})"),
            Self::HalfOpen {
                failure_count,
                success_count,
            } => write!(f, "half-open(failures={failure_count}, successes={success_count})"),
        }
    }
}

/// Thread-safe circuit breaker. All operations take `&self`, so one instance
/// can be shared between a reconnection loop and health-check callers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
    clock: InstantClock,
    label: String,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, system_instant_clock())
    }

    /// Create a breaker reading time from `clock` (for deterministic tests).
    pub fn with_clock(config: CircuitBreakerConfig, clock: InstantClock) -> Self {
        Self {
            config,
            state: Mutex::new(CircuitState::Closed { failure_count: 0 }),
            clock,
            label: String::from("breaker"),
        }
    }

    /// Set the label used in log lines (usually the exchange name).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn current_state(&self) -> CircuitState {
        *self.state.lock()
    }

    pub fn failure_count(&self) -> u32 {
        self.current_state().failure_count()
    }

    /// Whether an attempt may be made now. An open breaker whose cooldown has
    /// elapsed moves to half-open and answers `true`.
    pub fn can_attempt(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { .. } | CircuitState::HalfOpen { .. } => true,
            CircuitState::Open {
                failure_count,
                opened_at,
            } => {
                let now = (self.clock)();
                if now.saturating_duration_since(opened_at) >= self.config.timeout {
                    *state = CircuitState::HalfOpen {
                        failure_count,
                        success_count: 0,
                    };
                    info!("[{}] cooldown elapsed, half-open", self.label);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Time left until an open breaker allows a probe. Zero when not open.
    pub fn remaining_cooldown(&self) -> Duration {
        match *self.state.lock() {
            CircuitState::Open { opened_at, .. } => {
                let elapsed = (self.clock)().saturating_duration_since(opened_at);
                self.config.timeout.saturating_sub(elapsed)
            }
            _ => Duration::ZERO,
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { failure_count } => {
                let failure_count = failure_count.saturating_add(1);
                if failure_count >= self.config.failure_threshold {
                    *state = CircuitState::Open {
                        failure_count,
                        opened_at: (self.clock)(),
                    };
                    warn!(
                        "[{}] opened after {failure_count} failure(s), cooldown {:?}",
                        self.label, self.config.timeout
                    );
                } else {
                    *state = CircuitState::Closed { failure_count };
                }
            }
            // Cooldown window is not extended.
            CircuitState::Open {
                failure_count,
                opened_at,
            } => {
                *state = CircuitState::Open {
                    failure_count: failure_count.saturating_add(1),
                    opened_at,
                };
            }
            CircuitState::HalfOpen { failure_count, .. } => {
                *state = CircuitState::Open {
                    failure_count: failure_count.saturating_add(1),
                    opened_at: (self.clock)(),
                };
                warn!("[{}] probe failed, reopened", self.label);
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { .. } => {
                *state = CircuitState::Closed { failure_count: 0 };
            }
            CircuitState::HalfOpen {
                failure_count,
                success_count,
            } => {
                let success_count = success_count.saturating_add(1);
                if success_count >= self.config.success_threshold {
                    *state = CircuitState::Closed { failure_count: 0 };
                    info!("[{}] closed after {success_count} probe success(es)", self.label);
                } else {
                    *state = CircuitState::HalfOpen {
                        failure_count,
                        success_count,
                    };
                }
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Return to `Closed{0}` unconditionally.
    pub fn reset(&self) {
        *self.state.lock() = CircuitState::Closed { failure_count: 0 };
        info!("[{}] reset", self.label);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

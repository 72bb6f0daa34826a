//! Failure classification and start-of-task delay
//!
//! The retry queue retries every failed unit round-robin; there is no
//! exponential backoff. This module decides which errors are worth retrying at
//! all ([`IsRetryable`]) and how long a unit waits before it starts
//! ([`DelayPolicy`]).
//!
//! # Example
//!
//! ```no_run
//! use unsc_ingest::retry::DelayPolicy;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = DelayPolicy::Jitter { max: Duration::from_secs(10) };
//! policy.wait(1).await;
//! # }
//! ```

use crate::config::JitterConfig;
use crate::error::Error;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, bad statuses, missing documents)
/// return `true`. Fatal failures (configuration) return `false` and send a
/// unit straight to the terminal-failure collection.
pub trait IsRetryable {
    /// Returns true if the error is transient and the unit should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Transient upstream failures
            Error::Network(_) | Error::HttpStatus { .. } | Error::Protocol(_) => true,
            // Normally recovered by the caller before it reaches the queue
            Error::Conflict(_) => true,
            Error::DataInconsistency(_) => true,
            Error::Parse(_) => true,
            Error::Database(_) | Error::Sqlx(_) | Error::Io(_) => true,
            Error::Serialization(_) => true,
            // Config errors are permanent
            Error::Config { .. } => false,
        }
    }
}

/// How long a unit waits before its processing starts
///
/// The delay is a function of the attempt number so that callers can make
/// later attempts wait longer. Tests use [`DelayPolicy::None`].
#[derive(Clone, Default)]
pub enum DelayPolicy {
    /// Start immediately
    #[default]
    None,
    /// Always wait the same amount
    Fixed(Duration),
    /// Wait a uniformly random duration in `[0, max)`
    Jitter {
        /// Upper bound (exclusive)
        max: Duration,
    },
    /// Caller-provided function of the attempt number
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayPolicy {
    /// Build the policy described by a jitter configuration
    pub fn from_config(config: &JitterConfig) -> Self {
        if config.enabled && !config.max_delay.is_zero() {
            DelayPolicy::Jitter {
                max: config.max_delay,
            }
        } else {
            DelayPolicy::None
        }
    }

    /// Wrap a function of the attempt number
    pub fn custom(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        DelayPolicy::Custom(Arc::new(f))
    }

    /// Delay for the given attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            DelayPolicy::None => Duration::ZERO,
            DelayPolicy::Fixed(delay) => *delay,
            DelayPolicy::Jitter { max } => random_below(*max),
            DelayPolicy::Custom(f) => f(attempt),
        }
    }

    /// Sleep for the delay of the given attempt
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, delay_ms = delay.as_millis(), "Delaying task start");
            tokio::time::sleep(delay).await;
        }
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::None => write!(f, "None"),
            DelayPolicy::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            DelayPolicy::Jitter { max } => f.debug_struct("Jitter").field("max", max).finish(),
            DelayPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Uniformly random duration in `[0, max)`
fn random_below(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.0..1.0);
    Duration::from_secs_f64(max.as_secs_f64() * factor)
}

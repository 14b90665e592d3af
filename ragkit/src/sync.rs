//! Waiting for an asynchronously built index to become queryable.
//!
//! Search against an index that is not `Ready` is unsupported, so ingestion
//! blocks on [`await_ready`] after declaring the index. The wait is a bounded
//! poll loop: one status round trip per attempt, an async sleep between
//! attempts, a hard deadline, and a cancellation token checked while waiting.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::index::IndexState;
use crate::vectorstore::VectorStore;

/// Polling cadence and deadline for [`await_ready`].
///
/// # Example
///
/// ```rust,ignore
/// let config = SyncConfig::default()
///     .poll_interval(Duration::from_secs(2))
///     .timeout(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before the second status poll, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on the delay when backing off, in milliseconds.
    pub max_poll_interval_ms: u64,
    /// Multiplier applied to the delay after each poll. `1.0` polls at a fixed cadence.
    pub backoff_factor: f64,
    /// Hard ceiling on the total wait, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_poll_interval_ms: 10_000,
            backoff_factor: 1.0,
            timeout_ms: 300_000,
        }
    }
}

impl SyncConfig {
    /// Set a fixed poll interval.
    ///
    /// Durations are stored in whole milliseconds, rounded up.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = ceil_millis(interval);
        self.max_poll_interval_ms = self.max_poll_interval_ms.max(self.poll_interval_ms);
        self
    }

    /// Set the overall deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = ceil_millis(timeout);
        self
    }

    /// Grow the delay by `factor` after each poll, capped at `max_interval`.
    pub fn backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_poll_interval_ms = ceil_millis(max_interval);
        self
    }

    pub fn poll_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] for a zero poll interval, a
    /// backoff factor that is below `1.0` or not finite, or a cap below the
    /// initial interval.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(RagError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(RagError::InvalidConfig(format!(
                "backoff_factor ({}) must be a finite number of at least 1.0",
                self.backoff_factor
            )));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(RagError::InvalidConfig(
                "max_poll_interval_ms must not be below poll_interval_ms".into(),
            ));
        }
        Ok(())
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let max = Duration::from_millis(self.max_poll_interval_ms);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(max)
            .min(max)
    }
}

/// Whole milliseconds in `duration`, rounded up so sub-millisecond values stay non-zero.
fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Poll `store` until index `name` is `Ready`.
///
/// The first poll happens immediately. An index the backend does not list
/// yet counts as `Creating`.
///
/// # Errors
///
/// - [`RagError::IndexBuildFailed`] if the index reaches `Failed`
/// - [`RagError::IndexBuildTimeout`] if the deadline passes first
/// - [`RagError::Cancelled`] if `cancel` fires
/// - backend errors from the status probe are propagated as-is
pub async fn await_ready(
    store: &dyn VectorStore,
    name: &str,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    config.validate()?;

    let start = Instant::now();
    let deadline = start + config.timeout_duration();
    let mut delay = config.poll_duration();
    let mut last_state = IndexState::Creating;
    let mut attempts = 0u32;

    info!(index = name, timeout_ms = config.timeout_ms, "waiting for index build");

    let cancelled = || RagError::Cancelled(format!("waiting for index '{name}'"));
    let timed_out = |last_state: IndexState| {
        warn!(index = name, %last_state, "index build timed out");
        RagError::IndexBuildTimeout {
            index: name.to_string(),
            elapsed: start.elapsed(),
            last_state: last_state.to_string(),
        }
    };

    loop {
        attempts += 1;
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            status = store.index_status(name) => status?,
            _ = tokio::time::sleep_until(deadline) => return Err(timed_out(last_state)),
        };

        match status {
            Some(status) => match status.state {
                IndexState::Ready => {
                    info!(
                        index = name,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "index ready"
                    );
                    return Ok(());
                }
                IndexState::Failed => {
                    let reason = status.detail.unwrap_or_else(|| "no reason given".to_string());
                    warn!(index = name, %reason, "index build failed");
                    return Err(RagError::IndexBuildFailed { index: name.to_string(), reason });
                }
                state => {
                    last_state = state;
                    debug!(index = name, attempt = attempts, %state, "index still building");
                }
            },
            None => debug!(index = name, attempt = attempts, "index not listed yet"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(last_state));
        }

        let wait = delay.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(wait) => {}
        }
        delay = config.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_interval_and_shrinking_backoff() {
        let zero = SyncConfig { poll_interval_ms: 0, ..SyncConfig::default() };
        assert!(zero.validate().is_err());
        let shrinking = SyncConfig::default().backoff(0.5, Duration::from_secs(10));
        assert!(shrinking.validate().is_err());
    }

    #[test]
    fn backoff_is_capped() {
        let config = SyncConfig::default()
            .poll_interval(Duration::from_secs(1))
            .backoff(2.0, Duration::from_secs(5));
        let mut delay = config.poll_duration();
        let mut seen = Vec::new();
        for _ in 0..5 {
            delay = config.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 5, 5, 5]);
    }

    #[test]
    fn non_finite_backoff_is_rejected() {
        for factor in [f64::INFINITY, f64::NAN] {
            let config = SyncConfig::default().backoff(factor, Duration::from_secs(10));
            assert!(matches!(config.validate(), Err(RagError::InvalidConfig(_))));
        }
    }

    #[test]
    fn huge_backoff_saturates_at_the_cap() {
        let config = SyncConfig::default()
            .poll_interval(Duration::from_millis(100))
            .backoff(1e300, Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert_eq!(config.next_delay(config.poll_duration()), Duration::from_secs(1));
    }

    #[test]
    fn sub_millisecond_durations_round_up() {
        let config = SyncConfig::default()
            .poll_interval(Duration::from_micros(250))
            .timeout(Duration::from_nanos(1));
        assert_eq!(config.poll_interval_ms, 1);
        assert_eq!(config.timeout_ms, 1);
        assert!(config.validate().is_ok());
        assert_eq!(ceil_millis(Duration::ZERO), 0);
        assert_eq!(ceil_millis(Duration::from_millis(1500)), 1500);
    }
}

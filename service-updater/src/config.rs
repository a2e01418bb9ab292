//! Configuration for the batch controller, monitor and executors.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::StageName;
use crate::errors::UpdaterError;
use crate::utils::duration_ms;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Pause between entities in foreground mode.
    #[serde(default = "default_inter_entity_delay_ms")]
    pub inter_entity_delay_ms: u64,
    /// Hard race applied to the funnel generation call.
    #[serde(default = "default_funnel_timeout_ms")]
    pub funnel_timeout_ms: u64,
    /// Per-stage limits used by the stuck-state monitor.
    #[serde(default)]
    pub stage_timeouts: StageTimeouts,
    /// Period of the stuck-state sweep.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Consecutive positive sweeps needed before escalating.
    #[serde(default = "default_stuck_sweep_threshold")]
    pub stuck_sweep_threshold: u32,
    /// Error count at which recovery starts.
    #[serde(default = "default_max_errors_before_recovery")]
    pub max_errors_before_recovery: u32,
    /// Retry attempts handed to the persistence collaborator.
    #[serde(default = "default_update_retry_attempts")]
    pub update_retry_attempts: u32,
    /// Cap on persisted pricing tiers.
    #[serde(default = "default_max_pricing_tiers")]
    pub max_pricing_tiers: usize,
    /// Cap on persisted FAQs.
    #[serde(default = "default_max_faqs")]
    pub max_faqs: usize,
    /// Selections larger than this go to the background service when one is configured.
    #[serde(default = "default_background_threshold")]
    pub background_threshold: usize,
    /// Status polling for background mode.
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_inter_entity_delay_ms() -> u64 {
    2_000
}

fn default_funnel_timeout_ms() -> u64 {
    90_000
}

fn default_monitor_interval_ms() -> u64 {
    30_000
}

fn default_stuck_sweep_threshold() -> u32 {
    2
}

fn default_max_errors_before_recovery() -> u32 {
    5
}

fn default_update_retry_attempts() -> u32 {
    2
}

fn default_max_pricing_tiers() -> usize {
    4
}

fn default_max_faqs() -> usize {
    10
}

fn default_background_threshold() -> usize {
    10
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            inter_entity_delay_ms: default_inter_entity_delay_ms(),
            funnel_timeout_ms: default_funnel_timeout_ms(),
            stage_timeouts: StageTimeouts::default(),
            monitor_interval_ms: default_monitor_interval_ms(),
            stuck_sweep_threshold: default_stuck_sweep_threshold(),
            max_errors_before_recovery: default_max_errors_before_recovery(),
            update_retry_attempts: default_update_retry_attempts(),
            max_pricing_tiers: default_max_pricing_tiers(),
            max_faqs: default_max_faqs(),
            background_threshold: default_background_threshold(),
            polling: PollingConfig::default(),
        }
    }
}

impl UpdaterConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, UpdaterError> {
        serde_json::from_str(json).map_err(|e| UpdaterError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, UpdaterError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| UpdaterError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Sets the inter-entity delay.
    #[must_use]
    pub fn with_inter_entity_delay(mut self, delay: Duration) -> Self {
        self.inter_entity_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the funnel hard timeout.
    #[must_use]
    pub fn with_funnel_timeout(mut self, timeout: Duration) -> Self {
        self.funnel_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the monitor table.
    #[must_use]
    pub fn with_stage_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.stage_timeouts = timeouts;
        self
    }

    /// Sets the sweep period.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval_ms = duration_ms(interval);
        self
    }

    /// Sets the error count that triggers recovery.
    #[must_use]
    pub fn with_max_errors_before_recovery(mut self, max: u32) -> Self {
        self.max_errors_before_recovery = max;
        self
    }

    /// Sets the background threshold.
    #[must_use]
    pub fn with_background_threshold(mut self, threshold: usize) -> Self {
        self.background_threshold = threshold;
        self
    }

    /// Sets the polling configuration.
    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Inter-entity delay as a `Duration`.
    #[must_use]
    pub fn inter_entity_delay(&self) -> Duration {
        Duration::from_millis(self.inter_entity_delay_ms)
    }

    /// Funnel hard timeout as a `Duration`.
    #[must_use]
    pub fn funnel_timeout(&self) -> Duration {
        Duration::from_millis(self.funnel_timeout_ms)
    }

    /// Sweep period as a `Duration`.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// Per-stage time limits for the stuck-state monitor.
///
/// `funnel` is the shortest, `verification` next, everything else shares
/// `default_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Limit for the funnel stage.
    #[serde(default = "default_funnel_stuck_ms")]
    pub funnel_ms: u64,
    /// Limit for the verification stage.
    #[serde(default = "default_verification_stuck_ms")]
    pub verification_ms: u64,
    /// Limit for every other stage.
    #[serde(default = "default_stage_stuck_ms")]
    pub default_ms: u64,
}

fn default_funnel_stuck_ms() -> u64 {
    120_000
}

fn default_verification_stuck_ms() -> u64 {
    180_000
}

fn default_stage_stuck_ms() -> u64 {
    300_000
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            funnel_ms: default_funnel_stuck_ms(),
            verification_ms: default_verification_stuck_ms(),
            default_ms: default_stage_stuck_ms(),
        }
    }
}

impl StageTimeouts {
    /// Builds a table from explicit durations.
    #[must_use]
    pub fn new(funnel: Duration, verification: Duration, default: Duration) -> Self {
        Self {
            funnel_ms: duration_ms(funnel),
            verification_ms: duration_ms(verification),
            default_ms: duration_ms(default),
        }
    }

    /// Limit for a stage.
    #[must_use]
    pub fn for_stage(&self, stage: StageName) -> Duration {
        let ms = match stage {
            StageName::Funnel => self.funnel_ms,
            StageName::Verification => self.verification_ms,
            StageName::Research | StageName::Details | StageName::Disclaimer | StageName::Faqs => {
                self.default_ms
            }
        };
        Duration::from_millis(ms)
    }
}

/// Status polling for background batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between successful polls.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Delay after a failed poll.
    #[serde(default = "default_poll_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Consecutive transport failures tolerated before the batch is abandoned.
    #[serde(default = "default_poll_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_poll_retry_interval_ms() -> u64 {
    15_000
}

fn default_poll_max_consecutive_failures() -> u32 {
    20
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            retry_interval_ms: default_poll_retry_interval_ms(),
            max_consecutive_failures: default_poll_max_consecutive_failures(),
        }
    }
}

impl PollingConfig {
    /// Builds a polling configuration from durations.
    #[must_use]
    pub fn new(interval: Duration, retry_interval: Duration) -> Self {
        Self {
            interval_ms: duration_ms(interval),
            retry_interval_ms: duration_ms(retry_interval),
            max_consecutive_failures: default_poll_max_consecutive_failures(),
        }
    }

    /// Sets how many consecutive transport failures are tolerated.
    #[must_use]
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Backoff after a failed poll as a `Duration`.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

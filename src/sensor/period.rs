//! Adaptive read period

use crate::config::MeterConfig;
use std::time::Duration;

/// Current meter period with its bounds and step factor.
///
/// Each step scales the period in floating point, truncates it to whole
/// milliseconds and clamps it to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadPeriod {
    current_ms: u64,
    min_ms: u64,
    max_ms: u64,
    scale: f64,
}

impl ReadPeriod {
    pub fn new(current_ms: u64, min_ms: u64, max_ms: u64, scale: f64) -> Self {
        Self {
            current_ms: current_ms.max(min_ms).min(max_ms),
            min_ms,
            max_ms,
            scale,
        }
    }

    pub fn from_config(config: &MeterConfig) -> Self {
        Self::new(
            config.period_ms,
            config.min_period_ms,
            config.max_period_ms,
            config.scale,
        )
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.current_ms
    }

    /// Lengthen the period by one step; returns the new value in ms
    pub fn increase(&mut self) -> u64 {
        self.current_ms = self.scaled(self.current_ms as f64 * self.scale);
        self.current_ms
    }

    /// Shorten the period by one step; returns the new value in ms
    pub fn decrease(&mut self) -> u64 {
        self.current_ms = self.scaled(self.current_ms as f64 / self.scale);
        self.current_ms
    }

    fn scaled(&self, value: f64) -> u64 {
        (value.trunc() as u64).max(self.min_ms).min(self.max_ms)
    }
}

impl Default for ReadPeriod {
    fn default() -> Self {
        Self::from_config(&MeterConfig::default())
    }
}

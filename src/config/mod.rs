//! Configuration module for the sensor demo
//!
//! This module handles the demo's configuration:
//! - Scenario presets (`basic`, `bounded`, `adaptive`)
//! - Meter cadence and period bounds
//! - Writer pause range
//! - Per-channel capacity, overflow policy and send timeout
//!
//! # Config Location
//!
//! When no path is given on the command line, the config is read from the
//! platform config directory under `msgchain-rs`:
//!
//! - **Linux**: `~/.config/msgchain-rs/demo.toml`
//! - **macOS**: `~/Library/Application Support/msgchain-rs/demo.toml`
//! - **Windows**: `%APPDATA%\msgchain-rs\demo.toml`
//!
//! # Layering
//!
//! A config file only needs the keys it changes. The file is laid over the
//! preset of its `scenario` (default `adaptive`), table by table.
//!
//! ```toml
//! scenario = "bounded"
//!
//! [writer]
//! max_pause_ms = 600
//! ```

use crate::chain::{ChannelConfig, OverflowPolicy};
use crate::error::{ChainError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Directory name under the platform config dir
pub const APP_ID: &str = "msgchain-rs";

/// Config filename
pub const CONFIG_FILE: &str = "demo.toml";

/// Environment variable selecting the scenario when no config file exists
pub const SCENARIO_ENV: &str = "MSGCHAIN_SCENARIO";

/// Simulated meter read duration
pub const DEFAULT_READ_MS: u64 = 50;

/// Lower bound of the adaptive read period
pub const DEFAULT_MIN_PERIOD_MS: u64 = 50;

/// Upper bound of the adaptive read period
pub const DEFAULT_MAX_PERIOD_MS: u64 = 2000;

/// Factor applied by each `inc`/`dec`
pub const DEFAULT_PERIOD_SCALE: f64 = 1.5;

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

// ==================== Scenario ====================

/// Which of the three demo programs to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Unbounded channels, fixed 750ms period, fixed write time
    Basic,
    /// Bounded channels with overflow policies, random write time
    Bounded,
    /// Self-rescheduling meter with `inc`/`dec` control
    #[default]
    Adaptive,
}

impl Scenario {
    /// Whether the console accepts `inc`/`dec`
    pub fn has_control(&self) -> bool {
        matches!(self, Scenario::Adaptive)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Basic => write!(f, "basic"),
            Scenario::Bounded => write!(f, "bounded"),
            Scenario::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl FromStr for Scenario {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Scenario::Basic),
            "bounded" => Ok(Scenario::Bounded),
            "adaptive" => Ok(Scenario::Adaptive),
            other => Err(ChainError::InvalidConfig(format!(
                "unknown scenario '{}'",
                other
            ))),
        }
    }
}

// ==================== Meter Config ====================

/// Sensor reader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Simulated read duration in milliseconds
    pub read_ms: u64,

    /// Initial (adaptive) or fixed (periodic) read period in milliseconds
    pub period_ms: u64,

    /// Smallest period reachable with `dec`
    pub min_period_ms: u64,

    /// Largest period reachable with `inc`
    pub max_period_ms: u64,

    /// Factor applied per `inc`/`dec`
    pub scale: f64,
}

impl MeterConfig {
    fn with_period(period_ms: u64) -> Self {
        Self {
            read_ms: DEFAULT_READ_MS,
            period_ms,
            min_period_ms: DEFAULT_MIN_PERIOD_MS,
            max_period_ms: DEFAULT_MAX_PERIOD_MS,
            scale: DEFAULT_PERIOD_SCALE,
        }
    }

    /// Read duration
    pub fn read_duration(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    /// Period as a duration
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::with_period(300)
    }
}

// ==================== Writer Config ====================

/// File writer settings; equal bounds give a fixed pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Shortest simulated write in milliseconds
    pub min_pause_ms: u64,

    /// Longest simulated write in milliseconds (inclusive)
    pub max_pause_ms: u64,
}

impl WriterConfig {
    /// A writer that always pauses `ms`
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_pause_ms: ms,
            max_pause_ms: ms,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            min_pause_ms: 295,
            max_pause_ms: 1000,
        }
    }
}

// ==================== Channel Configs ====================

/// Configuration of the three demo channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// `inc`/`dec` signals to the meter
    pub control: ChannelConfig,

    /// Acquisition turns from the timer
    pub timer: ChannelConfig,

    /// Write commands from the meter to the writer
    pub writer: ChannelConfig,
}

// ==================== Demo Config ====================

/// Complete demo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Scenario to run
    pub scenario: Scenario,

    /// Meter settings
    pub meter: MeterConfig,

    /// Writer settings
    pub writer: WriterConfig,

    /// Channel settings
    pub channels: ChannelsConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::preset(Scenario::default())
    }
}

impl DemoConfig {
    /// Settings of one of the three demo programs
    pub fn preset(scenario: Scenario) -> Self {
        let bounded_channels = ChannelsConfig {
            control: ChannelConfig::unbounded(),
            timer: ChannelConfig::bounded(1, OverflowPolicy::DropNewest),
            writer: ChannelConfig::bounded(2, OverflowPolicy::RemoveOldest)
                .with_send_timeout(Duration::from_millis(300)),
        };

        match scenario {
            Scenario::Basic => Self {
                scenario,
                meter: MeterConfig::with_period(750),
                writer: WriterConfig::fixed(350),
                channels: ChannelsConfig::default(),
            },
            Scenario::Bounded => Self {
                scenario,
                meter: MeterConfig::with_period(300),
                writer: WriterConfig::default(),
                channels: bounded_channels,
            },
            Scenario::Adaptive => Self {
                scenario,
                meter: MeterConfig::with_period(300),
                writer: WriterConfig::default(),
                channels: bounded_channels,
            },
        }
    }

    /// Parse a TOML document laid over its scenario's preset
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overlay: toml::Table = toml::from_str(content)?;

        let scenario = match overlay.get("scenario") {
            Some(toml::Value::String(s)) => s.parse()?,
            Some(_) => {
                return Err(ChainError::InvalidConfig(
                    "scenario must be a string".to_string(),
                ))
            }
            None => Scenario::default(),
        };

        let mut base = toml::Table::try_from(Self::preset(scenario))
            .map_err(|e| ChainError::InvalidConfig(format!("Failed to encode preset: {}", e)))?;
        merge_tables(&mut base, overlay);

        let config: Self = toml::Value::Table(base).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ChainError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to load {:?}", path))
    }

    /// Load `path`, falling back to `fallback`'s preset on any error
    pub fn load_or_preset(path: impl AsRef<Path>, fallback: Scenario) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using '{}' preset: {}", fallback, e);
            Self::preset(fallback)
        })
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check bounds and channel settings
    pub fn validate(&self) -> Result<()> {
        let meter = &self.meter;
        if meter.min_period_ms == 0 {
            return Err(ChainError::InvalidConfig(
                "meter.min_period_ms must be above 0".to_string(),
            ));
        }
        if meter.min_period_ms > meter.max_period_ms {
            return Err(ChainError::InvalidConfig(format!(
                "meter.min_period_ms ({}) exceeds meter.max_period_ms ({})",
                meter.min_period_ms, meter.max_period_ms
            )));
        }
        if !(meter.min_period_ms..=meter.max_period_ms).contains(&meter.period_ms) {
            return Err(ChainError::InvalidConfig(format!(
                "meter.period_ms ({}) outside [{}, {}]",
                meter.period_ms, meter.min_period_ms, meter.max_period_ms
            )));
        }
        if !(meter.scale > 1.0 && meter.scale.is_finite()) {
            return Err(ChainError::InvalidConfig(format!(
                "meter.scale ({}) must be a finite number above 1",
                meter.scale
            )));
        }
        if self.writer.min_pause_ms > self.writer.max_pause_ms {
            return Err(ChainError::InvalidConfig(format!(
                "writer.min_pause_ms ({}) exceeds writer.max_pause_ms ({})",
                self.writer.min_pause_ms, self.writer.max_pause_ms
            )));
        }

        self.channels.control.validate().context("channels.control")?;
        self.channels.timer.validate().context("channels.timer")?;
        self.channels.writer.validate().context("channels.writer")?;
        Ok(())
    }
}

/// Recursively lay `overlay` over `base`; nested tables merge, values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ==================== Tests ====================

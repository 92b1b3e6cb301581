//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the ranging engine.
//! Configuration is loaded from:
//! 1. `config/dual_sonar.toml` (base configuration)
//! 2. Environment variables (prefixed with `DUAL_SONAR_`, sections split on `__`)
//!
//! Every section has defaults matching the reference wiring (trigger on GPIO 16,
//! echoes on GPIO 20 and 21), so a missing file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use dual_sonar::config::SonarConfig;
//!
//! let config = SonarConfig::load()?;
//! println!("Trigger line: {}", config.pins.trigger);
//! # Ok::<(), dual_sonar::error::SonarError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{SonarError, SonarResult};

/// Longest sampling period accepted, in seconds.
pub const MAX_PERIOD_SECS: u32 = 50;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// GPIO wiring
    pub pins: PinConfig,
    /// Sampling and timeout durations
    pub timing: TimingConfig,
    /// Targets for the simulated backend
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

/// GPIO line numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Shared trigger output
    pub trigger: u32,
    /// Echo inputs for channel 0 and channel 1
    pub echo: [u32; 2],
}

/// Timing configuration
///
/// The echo timeout is deliberately separate from the sampling period: it bounds the
/// longest echo the sensors can produce, not how often they are fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Initial sampling period in whole seconds (0 = disabled)
    pub sample_period_secs: u32,
    /// Deadline for an echo after each trigger pulse, in milliseconds
    pub echo_timeout_ms: u64,
    /// Trigger pulse width in microseconds
    pub trigger_pulse_us: u64,
    /// Upper bound on how long the consumer sleeps between checks, in milliseconds
    pub consumer_poll_ms: u64,
}

/// Simulated sensor setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Object distance per channel in millimetres; zero or negative means no echo returns
    pub targets_mm: [f64; 2],
    /// Random extra echo width in microseconds
    pub jitter_us: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "dual_sonar".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            trigger: 16,
            echo: [20, 21],
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sample_period_secs: 0,
            echo_timeout_ms: 60,
            trigger_pulse_us: 2,
            consumer_poll_ms: 10,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            targets_mm: [250.0, 1200.0],
            jitter_us: 20,
        }
    }
}

impl TimingConfig {
    /// Echo deadline as a `Duration`.
    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    /// Consumer poll bound as a `Duration`.
    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms)
    }
}

impl SimulationConfig {
    /// Targets with non-positive entries turned into "no echo".
    pub fn targets(&self) -> [Option<f64>; 2] {
        self.targets_mm.map(|mm| (mm > 0.0).then_some(mm))
    }
}

impl SonarConfig {
    /// Load configuration from `config/dual_sonar.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `DUAL_SONAR_`
    /// Example: `DUAL_SONAR_TIMING__ECHO_TIMEOUT_MS=40`
    pub fn load() -> SonarResult<Self> {
        Self::load_from("config/dual_sonar.toml")
    }

    /// Load configuration from a specific file path, then validate it
    pub fn load_from<P: AsRef<Path>>(path: P) -> SonarResult<Self> {
        let config: SonarConfig = Figment::from(Serialized::defaults(SonarConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DUAL_SONAR_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> SonarResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SonarError::InvalidConfig(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        crate::logging::parse_log_format(&self.application.log_format)
            .map_err(SonarError::InvalidConfig)?;

        let [echo0, echo1] = self.pins.echo;
        if echo0 == echo1 || self.pins.trigger == echo0 || self.pins.trigger == echo1 {
            return Err(SonarError::InvalidConfig(format!(
                "GPIO lines must be distinct (trigger {}, echo {} and {})",
                self.pins.trigger, echo0, echo1
            )));
        }

        let timing = &self.timing;
        if timing.sample_period_secs > MAX_PERIOD_SECS {
            return Err(SonarError::InvalidConfig(format!(
                "Invalid sample_period_secs {}. Must be 0-{}",
                timing.sample_period_secs, MAX_PERIOD_SECS
            )));
        }
        // must stay below the shortest non-zero period (1 s)
        if !(1..=999).contains(&timing.echo_timeout_ms) {
            return Err(SonarError::InvalidConfig(format!(
                "Invalid echo_timeout_ms {}. Must be 1-999",
                timing.echo_timeout_ms
            )));
        }
        if !(1..=100).contains(&timing.trigger_pulse_us) {
            return Err(SonarError::InvalidConfig(format!(
                "Invalid trigger_pulse_us {}. Must be 1-100",
                timing.trigger_pulse_us
            )));
        }
        if !(1..=1000).contains(&timing.consumer_poll_ms) {
            return Err(SonarError::InvalidConfig(format!(
                "Invalid consumer_poll_ms {}. Must be 1-1000",
                timing.consumer_poll_ms
            )));
        }

        if self.simulation.targets_mm.iter().any(|mm| !mm.is_finite()) {
            return Err(SonarError::InvalidConfig(
                "Simulation targets must be finite".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SonarConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pins.trigger, 16);
        assert_eq!(config.pins.echo, [20, 21]);
        assert_eq!(config.timing.trigger_pulse_us, 2);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = SonarConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(SonarError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = SonarConfig::default();
        config.application.log_format = "JSON".to_string();
        assert!(config.validate().is_ok());
        config.application.log_format = "syslog".to_string();
        assert!(matches!(config.validate(), Err(SonarError::InvalidConfig(_))));
    }

    #[test]
    fn test_shared_pins_rejected() {
        let mut config = SonarConfig::default();
        config.pins.echo = [20, 20];
        assert!(config.validate().is_err());

        let mut config = SonarConfig::default();
        config.pins.trigger = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_period_bounds() {
        let mut config = SonarConfig::default();
        config.timing.sample_period_secs = MAX_PERIOD_SECS;
        assert!(config.validate().is_ok());
        config.timing.sample_period_secs = MAX_PERIOD_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_independent_of_period() {
        let mut config = SonarConfig::default();
        config.timing.sample_period_secs = 1;
        config.timing.echo_timeout_ms = 1000;
        assert!(config.validate().is_err());
        config.timing.echo_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.timing.echo_timeout_ms = 38;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_targets_mean_no_echo() {
        let simulation = SimulationConfig {
            targets_mm: [0.0, 300.0],
            jitter_us: 0,
        };
        assert_eq!(simulation.targets(), [None, Some(300.0)]);
    }
}

//! Defines the configuration consumed by the `Scheduler`.
//!
//! The configuration is designed to be deserialized with `serde`, layering
//! built-in defaults, an optional TOML file and `CADENCE_`-prefixed environment
//! variables through the `config` crate. All durations are written as
//! (fractional) seconds.

use crate::error::SchedulerError;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default heartbeat of the run loop, in seconds.
pub const DEFAULT_RUN_LOOP_INTERVAL_SECS: f64 = 1.0;

/// The top-level configuration for a `Scheduler`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often the run loop wakes up to materialize newly queued requests.
    ///
    /// This bounds materialization latency, not firing latency.
    #[serde(
        default = "default_run_loop_interval",
        deserialize_with = "deserialize_secs"
    )]
    pub run_loop_interval: Duration,

    /// Named intervals resolved by `after_interval` and `at_interval`.
    #[serde(default, deserialize_with = "deserialize_secs_map")]
    pub intervals: HashMap<String, Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_loop_interval: default_run_loop_interval(),
            intervals: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Loads the configuration from defaults, an optional TOML file and the
    /// environment (`CADENCE_RUN_LOOP_INTERVAL`, `CADENCE_INTERVALS__<NAME>`).
    pub fn load(path: Option<&Path>) -> Result<Self, SchedulerError> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__"),
        );
        Self::finish(builder)
    }

    /// Parses the configuration from a TOML document layered over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, SchedulerError> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    /// Adds or replaces a named interval.
    pub fn with_interval(mut self, name: impl Into<String>, interval: Duration) -> Self {
        self.intervals.insert(name.into(), interval);
        self
    }

    /// Resolves a named interval.
    pub fn interval(&self, name: &str) -> Result<Duration, SchedulerError> {
        self.intervals
            .get(name)
            .copied()
            .ok_or_else(|| SchedulerError::UnknownInterval(name.to_string()))
    }

    /// Rejects zero durations, which would spin the reactor.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.run_loop_interval.is_zero() {
            return Err(SchedulerError::InvalidArgument(
                "run_loop_interval must be greater than zero".to_string(),
            ));
        }
        if let Some((name, _)) = self.intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(SchedulerError::InvalidArgument(format!(
                "interval '{name}' must be greater than zero"
            )));
        }
        Ok(())
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, SchedulerError> {
        Ok(Config::builder().set_default("run_loop_interval", DEFAULT_RUN_LOOP_INTERVAL_SECS)?)
    }

    fn finish(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, SchedulerError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

// --- Default value functions and duration helpers for serde ---

fn default_run_loop_interval() -> Duration {
    Duration::from_secs_f64(DEFAULT_RUN_LOOP_INTERVAL_SECS)
}

fn secs_to_duration<E: serde::de::Error>(secs: f64) -> Result<Duration, E> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| E::custom(format!("{secs} is not a valid number of seconds")))
}

pub(crate) fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    secs_to_duration(f64::deserialize(deserializer)?)
}

pub(crate) fn deserialize_secs_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    HashMap::<String, f64>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, secs)| Ok((name, secs_to_duration(secs)?)))
        .collect()
}

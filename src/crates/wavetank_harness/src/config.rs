use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Highest debug level understood by the engine interface.
pub const MAX_DEBUG_LEVEL: u8 = 4;

/// Source of the engine's primary settings payload.
///
/// The payload is the contents of the engine's primary input file. When the
/// harness is coupled to another code the payload is usually templated or
/// edited in memory and passed as [`SettingsSource::Inline`] rather than read
/// from disk on every iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    /// Payload held in memory, ready to hand to the engine.
    Inline(String),
    /// Payload read from a file at `initialize` time.
    File(PathBuf),
}

impl SettingsSource {
    /// Resolve the payload to its in-memory form.
    pub fn resolve(&self) -> HarnessResult<String> {
        match self {
            SettingsSource::Inline(payload) => Ok(payload.clone()),
            SettingsSource::File(path) => fs::read_to_string(path).map_err(|err| {
                HarnessError::configuration(format!(
                    "failed to read settings file {}: {err}",
                    path.display()
                ))
            }),
        }
    }
}

/// Engine-wide settings established before the first step.
///
/// The field set is fully enumerated and validated up front; deserializing a
/// config with unknown fields is an error rather than a silent accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Initial simulation time in seconds.
    pub t_start: f64,
    /// Final simulation time in seconds.
    pub t_final: f64,
    /// Interval the engine is called at, in seconds.
    pub dt: f64,
    /// Engine debug verbosity, 0-4.
    #[serde(default)]
    pub debug_level: u8,
    /// Primary engine settings payload.
    pub settings: SettingsSource,
    /// Optional destination for the per-point results table.
    #[serde(default)]
    pub results_path: Option<PathBuf>,
    /// Optional destination for the aggregated output channel table.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl SimulationConfig {
    /// Create a config for the given time window and settings payload.
    pub fn new(t_start: f64, t_final: f64, dt: f64, settings: SettingsSource) -> Self {
        Self {
            t_start,
            t_final,
            dt,
            debug_level: 0,
            settings,
            results_path: None,
            output_path: None,
        }
    }

    /// Set the engine debug verbosity.
    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Set the destination for the per-point results table.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }

    /// Set the destination for the aggregated channel table.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Check every setting needed before engine construction.
    pub fn validate(&self) -> HarnessResult<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(HarnessError::configuration(format!(
                "dt must be a positive finite value, got {}",
                self.dt
            )));
        }
        if !self.t_start.is_finite() || !self.t_final.is_finite() {
            return Err(HarnessError::configuration(
                "t_start and t_final must be finite",
            ));
        }
        if self.t_final < self.t_start {
            return Err(HarnessError::configuration(format!(
                "t_final ({}) precedes t_start ({})",
                self.t_final, self.t_start
            )));
        }
        if self.debug_level > MAX_DEBUG_LEVEL {
            return Err(HarnessError::configuration(format!(
                "debug_level must be 0-{MAX_DEBUG_LEVEL}, got {}",
                self.debug_level
            )));
        }
        Ok(())
    }
}

//! Simulation options.
//!
//! Options are an immutable snapshot taken at simulation start. Every check
//! runs before the first step, so a bad configuration never leaves partial
//! state behind.

use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// How per-controller errors are folded into one tier error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAggregation {
    /// Sum of absolute errors.
    #[default]
    Sum,
    /// Largest absolute error.
    Max,
}

impl ErrorAggregation {
    /// Fold one absolute error into the running aggregate.
    #[must_use]
    pub fn combine(self, aggregate: f64, error: f64) -> f64 {
        match self {
            Self::Sum => aggregate + error,
            Self::Max => aggregate.max(error),
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    pub start_day: i64,
    pub end_day: i64,
    pub step_resolution_minutes: u32,
    /// Error evaluations allowed per tier per step.
    pub max_control_iterations: u32,
    /// A tier has converged once its aggregate error drops below this.
    pub error_tolerance: f64,
    /// Commit a results snapshot after every step.
    pub log_results: bool,
    /// Hand each step's snapshot back to the caller of `run_step`.
    pub return_results: bool,
    /// Number of priority tiers.
    pub tier_count: usize,
    pub error_aggregation: ErrorAggregation,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            start_day: 0,
            end_day: 1,
            step_resolution_minutes: 15,
            max_control_iterations: 10,
            error_tolerance: 1.0,
            log_results: true,
            return_results: false,
            tier_count: 3,
            error_aggregation: ErrorAggregation::Sum,
        }
    }
}

/// Invalid run configuration. Always fatal, always raised before step 0.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_control_iterations must be at least 1")]
    NoIterations,

    #[error("error_tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("step_resolution_minutes must be at least 1")]
    ZeroResolution,

    #[error("end_day ({end_day}) must be after start_day ({start_day})")]
    EmptyHorizon { start_day: i64, end_day: i64 },

    #[error("horizon of {minutes} minutes at {resolution}-minute resolution has no steps")]
    NoSteps { minutes: i64, resolution: u32 },

    #[error("tier_count must be between 1 and 256, got {0}")]
    InvalidTierCount(usize),

    #[error("controller set has {found} tiers, options declare {expected}")]
    TierMismatch { expected: usize, found: usize },

    #[error("invalid configuration document: {0}")]
    Parse(String),
}

impl SimulationOptions {
    /// Check every option.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_control_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        if !(self.error_tolerance > 0.0 && self.error_tolerance.is_finite()) {
            return Err(ConfigError::InvalidTolerance(self.error_tolerance));
        }
        if self.step_resolution_minutes == 0 {
            return Err(ConfigError::ZeroResolution);
        }
        if self.end_day <= self.start_day {
            return Err(ConfigError::EmptyHorizon {
                start_day: self.start_day,
                end_day: self.end_day,
            });
        }
        if self.tier_count == 0 || self.tier_count > 256 {
            return Err(ConfigError::InvalidTierCount(self.tier_count));
        }
        Ok(())
    }

    /// Number of steps in the horizon,
    /// `floor((end_day - start_day) · 1440 / step_resolution_minutes)`.
    ///
    /// # Errors
    ///
    /// Any validation error, or [`ConfigError::NoSteps`] if the horizon is
    /// shorter than one step.
    pub fn total_steps(&self) -> Result<u64, ConfigError> {
        self.validate()?;
        let minutes = self
            .end_day
            .saturating_sub(self.start_day)
            .saturating_mul(MINUTES_PER_DAY);
        let steps = minutes / i64::from(self.step_resolution_minutes);
        match u64::try_from(steps) {
            Ok(steps) if steps > 0 => Ok(steps),
            _ => Err(ConfigError::NoSteps {
                minutes,
                resolution: self.step_resolution_minutes,
            }),
        }
    }

    /// Return a copy with the keys of a JSON object merged over these
    /// options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `overrides` is not an object or does
    /// not deserialise.
    pub fn with_overrides(&self, overrides: &serde_json::Value) -> Result<Self, ConfigError> {
        let serde_json::Value::Object(patch) = overrides else {
            return Err(ConfigError::Parse(
                "option overrides must be a JSON object".to_string(),
            ));
        };
        let mut merged =
            serde_json::to_value(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let serde_json::Value::Object(base) = &mut merged {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Which graph rewrites run before placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    /// Only validation, placement and copy insertion.
    Disabled,
    /// Redundant-node elimination.
    #[default]
    Basic,
}

impl FromStr for OptimizationLevel {
    type Err = RuntimeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "0" => Ok(OptimizationLevel::Disabled),
            "basic" | "1" => Ok(OptimizationLevel::Basic),
            other => Err(RuntimeError::usage(format!(
                "unknown optimization level '{other}'"
            ))),
        }
    }
}

/// Session construction and run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub optimization_level: OptimizationLevel,
    /// Upper bound on transformer pipeline sweeps. Values below 1 are treated as 1.
    pub max_transform_sweeps: usize,
    /// Release intermediates as soon as their last consumer ran; otherwise keep them until the
    /// frame is dropped.
    pub release_intermediates_early: bool,
    /// Log a JSON snapshot of the graph after every modifying pass.
    pub dump_ir: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::Basic,
            max_transform_sweeps: 5,
            release_intermediates_early: true,
            dump_ir: false,
        }
    }
}

impl SessionOptions {
    /// Parses options from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut options: SessionOptions = serde_json::from_str(json)?;
        options.max_transform_sweeps = options.max_transform_sweeps.max(1);
        Ok(options)
    }

    /// Applies `GRAPHRT_TRANSFORM_SWEEPS`, `GRAPHRT_OPT_LEVEL` and `GRAPHRT_DUMP_IR`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(sweeps) = crate::env::transform_sweeps() {
            self.max_transform_sweeps = sweeps.max(1);
        }
        if let Some(level) = crate::env::optimization_level() {
            match level.parse() {
                Ok(level) => self.optimization_level = level,
                Err(err) => tracing::warn!(%err, "ignoring GRAPHRT_OPT_LEVEL"),
            }
        }
        if crate::env::dump_ir_enabled() {
            self.dump_ir = true;
        }
        self
    }
}

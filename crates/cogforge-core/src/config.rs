//! Engine configuration.
//!
//! Every section defaults independently, so a TOML file only needs the keys
//! it changes. Environment overrides are applied on top of whatever was
//! loaded.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::fusion::FusionConfig;
use crate::quality::QualityWeights;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Convenience result alias.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Worker-pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Calls in flight at once for one stage.
    pub max_concurrent: usize,
    /// Deadline for one worker call.
    pub per_call_timeout_ms: u64,
    /// Deadline for a whole stage dispatch, shared by all batches.
    pub stage_deadline_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            per_call_timeout_ms: 120_000,
            stage_deadline_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Run the multi-agent path. When off, the linear pipeline runs instead.
    pub collaborative_enabled: bool,
    /// Retry a failed stage once with the whole roster.
    pub escalation_enabled: bool,
    /// After an unrecoverable stage failure, ask the linear pipeline for a
    /// degraded artifact.
    pub use_fallback_pipeline: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaborative_enabled: true,
            escalation_enabled: true,
            use_fallback_pipeline: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub fusion: FusionConfig,
    pub quality: QualityWeights,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .apply_env_overrides()
            .context("invalid config override from environment")?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Apply `COGFORGE_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(v) = lookup("COGFORGE_MAX_CONCURRENT") {
            self.pool.max_concurrent = parse_num("COGFORGE_MAX_CONCURRENT", &v)?;
        }
        if let Some(v) = lookup("COGFORGE_CALL_TIMEOUT_MS") {
            self.pool.per_call_timeout_ms = parse_num("COGFORGE_CALL_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("COGFORGE_STAGE_DEADLINE_MS") {
            self.pool.stage_deadline_ms = parse_num("COGFORGE_STAGE_DEADLINE_MS", &v)?;
        }
        if let Some(v) = lookup("COGFORGE_COLLABORATIVE") {
            self.orchestrator.collaborative_enabled = parse_bool("COGFORGE_COLLABORATIVE", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool.max_concurrent == 0 {
            return Err(invalid("pool.max_concurrent", "must be at least 1"));
        }
        if self.pool.per_call_timeout_ms == 0 {
            return Err(invalid("pool.per_call_timeout_ms", "must be positive"));
        }
        if self.pool.stage_deadline_ms == 0 {
            return Err(invalid("pool.stage_deadline_ms", "must be positive"));
        }

        let f = &self.fusion;
        for (field, value) in [
            ("fusion.variance_threshold", f.variance_threshold),
            ("fusion.similarity_threshold", f.similarity_threshold),
            ("fusion.min_anchor_coverage", f.min_anchor_coverage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{value} is outside [0, 1]")));
            }
        }
        if f.min_divergent_dimensions == 0 || f.min_divergent_dimensions > 6 {
            return Err(invalid(
                "fusion.min_divergent_dimensions",
                "must be between 1 and 6",
            ));
        }

        if let Some(d) = self.quality.invalid_dimension() {
            return Err(invalid(
                &format!("quality.{d}"),
                "weights must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("expected a number, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, format!("expected a boolean, got {value:?}"))),
    }
}

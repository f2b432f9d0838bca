use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ExperimentError, Result};

pub const ENV_MIN_SUBMISSIONS: &str = "FORMLAB_MIN_SUBMISSIONS";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "FORMLAB_CONFIDENCE_THRESHOLD";
pub const ENV_ASSIGNMENT: &str = "FORMLAB_ASSIGNMENT";
pub const ENV_HASH_SEED: &str = "FORMLAB_HASH_SEED";

/// How a user's first bucket is drawn. Both strategies record the result in
/// the sticky assignment table.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Uniform random draw per first contact.
    #[default]
    Random,
    /// MurmurHash3 of `test_id:user_id`; reproducible without the table.
    Hashed,
}

impl FromStr for AssignmentStrategy {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(AssignmentStrategy::Random),
            "hashed" | "hash" => Ok(AssignmentStrategy::Hashed),
            other => Err(ExperimentError::Config(format!(
                "unknown assignment strategy '{}', expected 'random' or 'hashed'",
                other
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Both compared variants need strictly more submissions than this
    /// before significance is computed.
    pub min_submissions: u64,
    /// Confidence (0–100) above which the leader is declared winner and the
    /// test completes.
    pub confidence_threshold: f64,
    pub assignment: AssignmentStrategy,
    pub hash_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_submissions: 30,
            confidence_threshold: 95.0,
            assignment: AssignmentStrategy::Random,
            hash_seed: 0,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `FORMLAB_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_var(ENV_MIN_SUBMISSIONS) {
            config.min_submissions = parse_env(ENV_MIN_SUBMISSIONS, &v)?;
        }
        if let Some(v) = env_var(ENV_CONFIDENCE_THRESHOLD) {
            config.confidence_threshold = parse_env(ENV_CONFIDENCE_THRESHOLD, &v)?;
        }
        if let Some(v) = env_var(ENV_ASSIGNMENT) {
            config.assignment = v.parse()?;
        }
        if let Some(v) = env_var(ENV_HASH_SEED) {
            config.hash_seed = parse_env(ENV_HASH_SEED, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 100.0) {
            return Err(ExperimentError::Config(format!(
                "confidenceThreshold must be in (0, 100], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ExperimentError::Config(format!("{}={:?}: {}", name, value, e)))
}

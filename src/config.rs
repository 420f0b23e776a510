//! Engine configuration
//!
//! Defaults mirror the API server's runtime limits. Values can be overridden
//! from the environment for disconnected evaluation.

use std::time::Duration;

use crate::error::{Error, Result};

/// Per-call CEL cost budget used by the API server
pub const RUNTIME_CEL_COST_BUDGET: u64 = 10_000_000;

/// Environment variable overriding [`EngineConfig::cost_budget`]
pub const COST_BUDGET_ENV: &str = "VAP_COST_BUDGET";

/// Environment variable overriding [`EngineConfig::timeout`], in seconds
pub const TIMEOUT_ENV: &str = "VAP_TIMEOUT_SECS";

/// Evaluation limits applied to a single `validate` call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total expression cost allowed across all rules of one evaluation
    pub cost_budget: u64,
    /// Upper bound for the whole call, including cluster lookups
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cost_budget: RUNTIME_CEL_COST_BUDGET,
            timeout: None,
        }
    }
}

impl EngineConfig {
    /// Build a config from `VAP_COST_BUDGET` and `VAP_TIMEOUT_SECS`, falling
    /// back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(COST_BUDGET_ENV) {
            config.cost_budget = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{} must be an unsigned integer: {}", COST_BUDGET_ENV, raw))
            })?;
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a number of seconds: {}", TIMEOUT_ENV, raw))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_cost_budget(mut self, cost_budget: u64) -> Self {
        self.cost_budget = cost_budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

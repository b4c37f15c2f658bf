use std::time::Duration;

use anyhow::{bail, Context, Result};
use bridge::DEFAULT_POOL_SIZE;
use dispatch::DEFAULT_SHARDS;
use serde::Deserialize;

/// Environment variable overriding [`TesterConfig::job_pool_size`].
pub const ENV_JOB_POOL_SIZE: &str = "TESTER_JOB_POOL_SIZE";
/// Environment variable overriding [`TesterConfig::run_timeout_ms`].
pub const ENV_RUN_TIMEOUT_MS: &str = "TESTER_RUN_TIMEOUT_MS";
/// Environment variable overriding [`TesterConfig::pending_shards`].
pub const ENV_PENDING_SHARDS: &str = "TESTER_PENDING_SHARDS";

/// Default time a run may take before it is torn down.
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 30_000;

/// Knobs for a tester run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesterConfig {
    /// Concurrent sends allowed into the engine.
    pub job_pool_size: usize,
    /// Upper bound on a whole run, in milliseconds.
    pub run_timeout_ms: u64,
    /// Shard count of the pending-request table.
    pub pending_shards: usize,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            job_pool_size: DEFAULT_POOL_SIZE,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            pending_shards: DEFAULT_SHARDS,
        }
    }
}

impl TesterConfig {
    /// Parses a JSON object; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("parse tester config")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TESTER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_JOB_POOL_SIZE) {
            self.job_pool_size = parse_var(ENV_JOB_POOL_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RUN_TIMEOUT_MS) {
            self.run_timeout_ms = parse_var(ENV_RUN_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PENDING_SHARDS) {
            self.pending_shards = parse_var(ENV_PENDING_SHARDS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.job_pool_size == 0 {
            bail!("job_pool_size must be at least 1");
        }
        if self.pending_shards == 0 {
            bail!("pending_shards must be at least 1");
        }
        if self.run_timeout_ms == 0 {
            bail!("run_timeout_ms must be positive");
        }
        Ok(())
    }

    /// [`run_timeout_ms`](Self::run_timeout_ms) as a duration.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Returns a copy with a different run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}={raw:?} is not a valid number"))
}

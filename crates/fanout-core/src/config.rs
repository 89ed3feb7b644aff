use std::{str::FromStr, time::Duration};

use thiserror::Error;

pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const MAX_WORKERS_LIMIT: usize = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SIMULATED_BACKOFF: Duration = Duration::from_millis(1000);

pub const ENV_MAX_WORKERS: &str = "FANOUT_MAX_WORKERS";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "FANOUT_ACQUIRE_TIMEOUT_MS";
pub const ENV_HANDLE_SIGNALS: &str = "FANOUT_HANDLE_SIGNALS";
pub const ENV_SIMULATE_EVERY: &str = "FANOUT_SIMULATE_RATE_LIMIT_EVERY";
pub const ENV_SIMULATE_BACKOFF_MS: &str = "FANOUT_SIMULATE_RATE_LIMIT_BACKOFF_MS";
pub const ENV_CREDENTIALS: &str = "FANOUT_CREDENTIALS";
pub const ENV_CREDENTIAL_LIMIT: &str = "FANOUT_CREDENTIAL_LIMIT";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Force a rate-limit response on every `every`-th credential acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSimulation {
    pub every: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Requested parallelism; clamped to `1..=10` by the coordinator.
    pub max_workers: usize,
    /// Upper bound on a single credential wait.
    pub acquire_timeout: Duration,
    /// Install SIGINT/SIGTERM listeners for the duration of each run.
    pub handle_signals: bool,
    pub rate_limit_simulation: Option<RateLimitSimulation>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            handle_signals: true,
            rate_limit_simulation: None,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by `FANOUT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(n) = parse_var::<usize>(&lookup, ENV_MAX_WORKERS)? {
            cfg.max_workers = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_ACQUIRE_TIMEOUT_MS)? {
            cfg.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_HANDLE_SIGNALS) {
            cfg.handle_signals = parse_bool(ENV_HANDLE_SIGNALS, &raw)?;
        }
        if let Some(every) = parse_var::<u32>(&lookup, ENV_SIMULATE_EVERY)? {
            if every == 0 {
                return Err(ConfigError::Invalid {
                    var: ENV_SIMULATE_EVERY,
                    value: every.to_string(),
                    reason: "must be at least 1".into(),
                });
            }
            let backoff = parse_var::<u64>(&lookup, ENV_SIMULATE_BACKOFF_MS)?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SIMULATED_BACKOFF);
            cfg.rate_limit_simulation = Some(RateLimitSimulation { every, backoff });
        }

        Ok(cfg)
    }
}

/// Credential keys from `FANOUT_CREDENTIALS`, capped by `FANOUT_CREDENTIAL_LIMIT`.
pub fn credential_keys_from_env() -> Result<Vec<String>, ConfigError> {
    credential_keys_from_lookup(|k| std::env::var(k).ok())
}

pub fn credential_keys_from_lookup<F>(lookup: F) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys: Vec<String> = lookup(ENV_CREDENTIALS)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(limit) = parse_var::<usize>(&lookup, ENV_CREDENTIAL_LIMIT)? {
        keys.truncate(limit);
    }
    Ok(keys)
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected true|false".into(),
        }),
    }
}

//! Runtime configuration, read from `PRINTFORGE_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;

use printforge_orders::ShippingRates;

use crate::retry::RetryPolicy;

/// Download attempts are never allowed above this.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 5;

/// Per-stage timeouts for external calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub submit: Duration,
    pub poll: Duration,
    pub fetch: Duration,
    pub download: Duration,
    pub upload: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            submit: Duration::from_secs(30),
            poll: Duration::from_secs(30),
            fetch: Duration::from_secs(60),
            download: Duration::from_secs(180),
            upload: Duration::from_secs(120),
        }
    }
}

/// Bounded retry around "result not yet available" while fetching a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRetry {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for DownloadRetry {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DOWNLOAD_ATTEMPTS,
            backoff: Duration::from_millis(2000),
        }
    }
}

impl DownloadRetry {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts.min(MAX_DOWNLOAD_ATTEMPTS), self.backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub delivery_bonus_percent: u32,
    pub default_provider: String,
    pub timeouts: TimeoutConfig,
    pub download_retry: DownloadRetry,
    /// Optimistic-concurrency retries for one ledger mutation.
    pub ledger_max_retries: u32,
    pub shipping_rates: ShippingRates,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delivery_bonus_percent: 10,
            default_provider: "meshy".to_string(),
            timeouts: TimeoutConfig::default(),
            download_retry: DownloadRetry::default(),
            ledger_max_retries: 8,
            shipping_rates: ShippingRates::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            Ok(Duration::from_secs(parse_or(&lookup, key, default.as_secs())?))
        };

        let max_attempts: u32 = parse_or(
            &lookup,
            "PRINTFORGE_DOWNLOAD_MAX_ATTEMPTS",
            defaults.download_retry.max_attempts,
        )?;
        if max_attempts == 0 {
            anyhow::bail!("PRINTFORGE_DOWNLOAD_MAX_ATTEMPTS must be at least 1");
        }

        let default_provider = lookup("PRINTFORGE_DEFAULT_PROVIDER")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_provider);

        Ok(Config {
            delivery_bonus_percent: parse_or(
                &lookup,
                "PRINTFORGE_DELIVERY_BONUS_PERCENT",
                defaults.delivery_bonus_percent,
            )?,
            default_provider,
            timeouts: TimeoutConfig {
                submit: secs("PRINTFORGE_SUBMIT_TIMEOUT_SECS", defaults.timeouts.submit)?,
                poll: secs("PRINTFORGE_POLL_TIMEOUT_SECS", defaults.timeouts.poll)?,
                fetch: secs("PRINTFORGE_FETCH_TIMEOUT_SECS", defaults.timeouts.fetch)?,
                download: secs("PRINTFORGE_DOWNLOAD_TIMEOUT_SECS", defaults.timeouts.download)?,
                upload: secs("PRINTFORGE_UPLOAD_TIMEOUT_SECS", defaults.timeouts.upload)?,
            },
            download_retry: DownloadRetry {
                max_attempts: max_attempts.min(MAX_DOWNLOAD_ATTEMPTS),
                backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "PRINTFORGE_DOWNLOAD_BACKOFF_MS",
                    defaults.download_retry.backoff.as_millis() as u64,
                )?),
            },
            ledger_max_retries: parse_or(
                &lookup,
                "PRINTFORGE_LEDGER_MAX_RETRIES",
                defaults.ledger_max_retries,
            )?,
            shipping_rates: defaults.shipping_rates,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

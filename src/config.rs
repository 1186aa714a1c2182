//! Environment-driven configuration

use crate::follower_aggregator::AggregatorConfig;
use crate::interaction_detector::InteractionConfig;
use crate::model::Credentials;
use crate::profile_fetcher::ProfileFetcherConfig;
use crate::retry_policy::RetryConfig;
use anyhow::{anyhow, Context, Result};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BlueSparkConfig {
    pub service_url: String,
    pub identifier: Option<String>,
    pub password: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub aggregator: AggregatorConfig,
    pub profile: ProfileFetcherConfig,
    pub interactions: InteractionConfig,
    pub retry: RetryConfig,
    pub requests_per_minute: u32,
    pub http_timeout: Duration,
    pub stats_file: PathBuf,
}

impl BlueSparkConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let posts_limit = parse_var(&lookup, "POSTS_PAGE_SIZE", 50usize)?;

        Ok(Self {
            service_url: text("BLUESKY_SERVICE_URL")
                .unwrap_or_else(|| "https://bsky.social".to_string()),
            identifier: text("BLUESKY_IDENTIFIER"),
            password: text("BLUESKY_PASSWORD"),
            openrouter_api_key: text("OPENROUTER_API_KEY"),
            openrouter_model: text("OPENROUTER_MODEL")
                .unwrap_or_else(|| "anthropic/claude-3.5-haiku-20241022".to_string()),
            aggregator: AggregatorConfig {
                target_count: parse_var(&lookup, "FOLLOWERS_TARGET", 20usize)?,
                batch_size: parse_var(&lookup, "FOLLOWERS_BATCH_SIZE", 25usize)?,
            },
            profile: ProfileFetcherConfig { posts_limit },
            interactions: InteractionConfig {
                feed_limit: posts_limit,
                ..InteractionConfig::default()
            },
            retry: RetryConfig {
                max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS", 3u32)?,
                initial_delay: Duration::from_millis(parse_var(
                    &lookup,
                    "RETRY_INITIAL_DELAY_MS",
                    1000u64,
                )?),
                max_jitter: Duration::from_millis(parse_var(
                    &lookup,
                    "RETRY_MAX_JITTER_MS",
                    250u64,
                )?),
            },
            requests_per_minute: parse_var(&lookup, "REQUESTS_PER_MINUTE", 600u32)?,
            http_timeout: Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30u64)?),
            stats_file: text("STATS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/api_stats.json")),
        })
    }

    /// Login credentials; both variables must be set.
    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.identifier, &self.password) {
            (Some(identifier), Some(password)) => Ok(Credentials {
                identifier: identifier.clone(),
                password: password.clone(),
            }),
            _ => Err(anyhow!(
                "BLUESKY_IDENTIFIER and BLUESKY_PASSWORD must be set"
            )),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: '{value}'")),
        _ => Ok(default),
    }
}

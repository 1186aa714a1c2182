use crate::error::ApiError;
use crate::social_client::ResponseMetadata;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Values above this are unix timestamps rather than seconds-from-now
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Parsed rate-limit envelope of a single response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Absolute deadline, converted as soon as the header is read
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Convert a `ratelimit-reset` value into a wait duration from now.
pub fn reset_delay(value: u64) -> Duration {
    if value >= EPOCH_THRESHOLD {
        let now = Utc::now().timestamp().max(0) as u64;
        Duration::from_secs(value.saturating_sub(now))
    } else {
        Duration::from_secs(value)
    }
}

/// Tracks remote quota and paces outbound calls
pub struct RateLimitTracker {
    // Client-side pacing of every outbound call
    pacer: DefaultDirectRateLimiter,
    // Set when the remote reports an exhausted quota
    blocked_until: Mutex<Option<DateTime<Utc>>>,
    last_status: Mutex<Option<RateLimitStatus>>,
    default_wait: Duration,
}

impl RateLimitTracker {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            pacer: RateLimiter::direct(Quota::per_minute(per_minute)),
            blocked_until: Mutex::new(None),
            last_status: Mutex::new(None),
            default_wait: Duration::from_secs(60),
        }
    }

    /// Parse the rate-limit envelope, if the response carries one.
    pub fn inspect(metadata: &ResponseMetadata) -> Option<RateLimitStatus> {
        let limit = metadata.header("ratelimit-limit")?.parse::<u32>().ok()?;
        let remaining = metadata.header("ratelimit-remaining")?.parse::<u32>().ok()?;
        let reset = metadata.header("ratelimit-reset")?.parse::<u64>().ok()?;

        let wait = chrono::Duration::from_std(reset_delay(reset)).ok()?;
        Some(RateLimitStatus {
            limit,
            remaining,
            reset_at: Utc::now() + wait,
        })
    }

    /// Inspect a response and arm the block deadline when the quota is spent.
    pub fn observe(&self, metadata: &ResponseMetadata) -> Option<RateLimitStatus> {
        let status = Self::inspect(metadata)?;
        *self.last_status.lock() = Some(status);

        if status.is_exhausted() {
            warn!(
                "Remote quota exhausted ({}/{}), blocking calls until {}",
                status.remaining, status.limit, status.reset_at
            );
            self.block_until(status.reset_at);
        } else {
            debug!(
                "Remote quota: {}/{} remaining, resets at {}",
                status.remaining, status.limit, status.reset_at
            );
        }

        Some(status)
    }

    /// Observe a successful response; a spent quota counts as rate limited
    /// even though the call itself went through.
    pub fn admit(&self, metadata: &ResponseMetadata) -> Result<(), ApiError> {
        match self.observe(metadata) {
            Some(status) if status.is_exhausted() => {
                Err(ApiError::rate_limited_until(status.reset_at))
            }
            _ => Ok(()),
        }
    }

    /// Arm the block deadline after a 429 response
    pub fn record_rate_limited(&self, retry_after: Option<Duration>) {
        let wait = retry_after.unwrap_or(self.default_wait);
        let Ok(wait) = chrono::Duration::from_std(wait) else {
            return;
        };
        self.block_until(Utc::now() + wait);

        warn!(
            "Rate limited by remote: {}",
            retry_after
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or("default".to_string())
        );
    }

    fn block_until(&self, deadline: DateTime<Utc>) {
        let mut blocked = self.blocked_until.lock();
        // Keep the later deadline
        if blocked.map_or(true, |current| current < deadline) {
            *blocked = Some(deadline);
        }
    }

    /// Fail fast while a known reset deadline lies in the future.
    pub fn check_quota(&self) -> Result<(), ApiError> {
        let mut blocked = self.blocked_until.lock();
        match *blocked {
            Some(deadline) if deadline > Utc::now() => {
                debug!("Quota blocked until {}", deadline);
                Err(ApiError::rate_limited_until(deadline))
            }
            Some(_) => {
                *blocked = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Get the wait time until calls are allowed again
    pub fn wait_time(&self) -> Option<Duration> {
        self.blocked_until
            .lock()
            .and_then(|deadline| (deadline - Utc::now()).to_std().ok())
    }

    pub fn last_status(&self) -> Option<RateLimitStatus> {
        *self.last_status.lock()
    }

    /// Wait for the local pacing quota.
    pub async fn pace(&self) {
        if self.pacer.check().is_err() {
            debug!("Outbound call pacing engaged");
            self.pacer.until_ready().await;
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(600)
    }
}

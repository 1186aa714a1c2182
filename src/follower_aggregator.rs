//! Follower Aggregator - Collects a bounded list of enriched followers
//!
//! Pages through an account's follower listing and enriches each follower
//! with its profile and recent posts, one follower at a time. Enrichment
//! failures degrade the single record; only a failed listing call aborts.

use crate::error::{ApiError, ErrorKind};
use crate::model::{FollowerRecord, PaginationCursor};
use crate::notifier::{Notice, Notifier};
use crate::profile_fetcher::ProfileFetcher;
use crate::session_gateway::SessionGateway;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Configuration for the follower aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Number of follower records to return
    pub target_count: usize,
    /// Number of follower stubs requested per listing page
    pub batch_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            target_count: 20,
            batch_size: 25,
        }
    }
}

pub struct FollowerAggregator {
    gateway: Arc<SessionGateway>,
    fetcher: ProfileFetcher,
    notifier: Arc<dyn Notifier>,
    config: AggregatorConfig,
}

impl FollowerAggregator {
    pub fn new(
        gateway: Arc<SessionGateway>,
        fetcher: ProfileFetcher,
        notifier: Arc<dyn Notifier>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            gateway,
            fetcher,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Load followers using the configured target and batch size.
    pub async fn load_followers(&self, handle: &str) -> Result<Vec<FollowerRecord>, ApiError> {
        self.load_followers_with(handle, self.config.target_count, self.config.batch_size)
            .await
    }

    /// Load up to `target_count` followers of `handle`, in listing order.
    ///
    /// Emits exactly one outcome notice.
    pub async fn load_followers_with(
        &self,
        handle: &str,
        target_count: usize,
        batch_size: usize,
    ) -> Result<Vec<FollowerRecord>, ApiError> {
        match self.collect(handle, target_count, batch_size).await {
            Ok(followers) => {
                let degraded = followers.iter().filter(|f| f.is_degraded()).count();
                let message = if degraded > 0 {
                    format!(
                        "Loaded {} followers ({} with partial details)",
                        followers.len(),
                        degraded
                    )
                } else {
                    format!("Loaded {} followers", followers.len())
                };
                self.notifier.notify(Notice::success(message));
                Ok(followers)
            }
            Err(e) => {
                error!("Failed to load followers for {}: {}", handle, e);
                let message = if e.kind() == ErrorKind::RateLimited {
                    e.to_string()
                } else {
                    "Failed to load followers".to_string()
                };
                self.notifier.notify(Notice::error(message));
                Err(e)
            }
        }
    }

    async fn collect(
        &self,
        handle: &str,
        target_count: usize,
        batch_size: usize,
    ) -> Result<Vec<FollowerRecord>, ApiError> {
        let batch_size = batch_size.max(1);
        let mut collected: Vec<FollowerRecord> = Vec::with_capacity(target_count);
        let mut cursor: Option<PaginationCursor> = None;
        let mut page_number = 0u64;
        let mut failed_fetches = 0usize;

        while collected.len() < target_count {
            page_number += 1;
            info!(
                "📄 Fetching follower page #{} for {} ({}/{} collected)",
                page_number,
                handle,
                collected.len(),
                target_count
            );

            let page = self
                .gateway
                .get_followers(handle, batch_size, cursor.as_ref())
                .await?;

            if page.items.is_empty() {
                debug!("Follower listing for {} exhausted", handle);
                break;
            }

            for stub in &page.items {
                if collected.len() >= target_count {
                    break;
                }

                match self.fetcher.fetch(&stub.handle).await {
                    Ok(profile) => collected.push(FollowerRecord::complete(profile)),
                    // Every later call would fail the same way until the reset
                    Err(e) if e.kind() == ErrorKind::RateLimited => return Err(e),
                    Err(e) => {
                        let e = ApiError::enrichment(&stub.handle, e);
                        warn!("Failed to fetch details for follower: {}", e);
                        failed_fetches += 1;
                        collected.push(FollowerRecord::degraded(stub));
                    }
                }
            }

            match page.cursor {
                // Protection against listings that don't advance their cursor
                Some(next) if cursor.as_ref() == Some(&next) => {
                    warn!(
                        "⚠️  Follower listing for {} returned the same cursor twice, stopping",
                        handle
                    );
                    break;
                }
                Some(next) => cursor = Some(next),
                None => {
                    if collected.len() < target_count {
                        debug!("No continuation cursor for {}, no more followers", handle);
                    }
                    break;
                }
            }
        }

        if failed_fetches > 0 {
            warn!(
                "Failed to fetch complete details for {} followers",
                failed_fetches
            );
        }

        collected.truncate(target_count);
        info!(
            "📦 Collected {} followers for {} across {} page(s)",
            collected.len(),
            handle,
            page_number
        );
        Ok(collected)
    }
}

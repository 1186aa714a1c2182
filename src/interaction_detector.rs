//! Detection of recent interactions between two accounts
//!
//! A heuristic: an interaction is a recent post by one account that mentions
//! or replies to the other. Matching goes by account id, never by handle.
//! Checks never fail; anything that goes wrong reads as "no interaction".

use crate::error::ApiError;
use crate::model::{AccountId, InteractionResult, Post};
use crate::session_gateway::SessionGateway;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct InteractionConfig {
    /// Trailing window in which a post counts as recent
    pub window: Duration,
    /// Number of feed items fetched per account
    pub feed_limit: usize,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            window: Duration::days(7),
            feed_limit: 50,
        }
    }
}

/// One follower's result from a background scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionUpdate {
    pub follower_id: AccountId,
    pub result: InteractionResult,
}

#[derive(Clone)]
pub struct InteractionDetector {
    gateway: Arc<SessionGateway>,
    config: InteractionConfig,
}

impl InteractionDetector {
    pub fn new(gateway: Arc<SessionGateway>, config: InteractionConfig) -> Self {
        Self { gateway, config }
    }

    /// Check whether either account recently mentioned or replied to the other.
    pub async fn check(&self, primary: &AccountId, other: &AccountId) -> InteractionResult {
        match self.try_check(primary, other, Utc::now()).await {
            Ok(result) => result,
            Err(e) => {
                let e = ApiError::enrichment(format!("interaction {primary} <-> {other}"), e);
                warn!("{}", e);
                InteractionResult::none()
            }
        }
    }

    /// Look for a reference from `primary` to `other` inside the window.
    ///
    /// The feeds are fetched one after the other rather than both up front:
    /// the second feed is only requested when the first has no match, so a
    /// hit on `primary` costs one call and a failure of the `other` feed
    /// cannot mask it.
    async fn try_check(
        &self,
        primary: &AccountId,
        other: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<InteractionResult, ApiError> {
        let window_start = now - self.config.window;

        let primary_feed = self
            .gateway
            .get_recent_activity(primary, self.config.feed_limit)
            .await?;
        if let Some(at) = latest_reference(&primary_feed, other, window_start) {
            debug!("{} referenced {} at {}", primary, other, at);
            return Ok(InteractionResult::at(at));
        }

        // Only fetched when the primary feed had no match
        let other_feed = self
            .gateway
            .get_recent_activity(other, self.config.feed_limit)
            .await?;
        Ok(match latest_reference(&other_feed, primary, window_start) {
            Some(at) => {
                debug!("{} referenced {} at {}", other, primary, at);
                InteractionResult::at(at)
            }
            None => InteractionResult::none(),
        })
    }

    /// Check each follower in turn on a background task.
    ///
    /// Results arrive one at a time on the returned channel. The scan stops
    /// between followers once `token` is cancelled or the receiver is dropped;
    /// a result that completes after cancellation is discarded.
    pub fn spawn_scan(
        &self,
        primary: AccountId,
        followers: Vec<AccountId>,
        token: CancellationToken,
    ) -> flume::Receiver<InteractionUpdate> {
        let (tx, rx) = flume::unbounded();
        let detector = self.clone();

        tokio::spawn(async move {
            let total = followers.len();
            let mut checked = 0usize;

            for follower_id in followers {
                if token.is_cancelled() {
                    debug!("Interaction scan cancelled after {}/{}", checked, total);
                    return;
                }

                let result = detector.check(&primary, &follower_id).await;
                checked += 1;

                if token.is_cancelled() {
                    debug!("Interaction scan cancelled, dropping result for {}", follower_id);
                    return;
                }
                if tx.send(InteractionUpdate { follower_id, result }).is_err() {
                    debug!("Interaction scan receiver dropped after {}/{}", checked, total);
                    return;
                }
            }

            info!("✅ Interaction scan complete for {} followers", total);
        });

        rx
    }
}

/// Most recent in-window post in `feed` that references `target`.
///
/// The whole bounded page is scanned: feeds are mostly newest-first but
/// pinned posts and reposts break strict ordering. Reposts carry someone
/// else's text and never count.
pub fn latest_reference(
    feed: &[Post],
    target: &AccountId,
    window_start: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    feed.iter()
        .filter(|post| !post.is_repost)
        .filter(|post| post.indexed_at >= window_start)
        .filter(|post| post.references(target))
        .map(|post| post.indexed_at)
        .max()
}

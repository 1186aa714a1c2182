use crate::error::ApiError;
use crate::model::{AccountProfile, Post, ProfileData};
use crate::session_gateway::SessionGateway;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProfileFetcherConfig {
    /// Number of recent posts fetched with each profile
    pub posts_limit: usize,
}

impl Default for ProfileFetcherConfig {
    fn default() -> Self {
        Self { posts_limit: 50 }
    }
}

/// Fetches one account's profile together with its recent posts
#[derive(Clone)]
pub struct ProfileFetcher {
    gateway: Arc<SessionGateway>,
    config: ProfileFetcherConfig,
}

impl ProfileFetcher {
    pub fn new(gateway: Arc<SessionGateway>, config: ProfileFetcherConfig) -> Self {
        Self { gateway, config }
    }

    /// Fetch the profile, then its recent posts. Either failure fails the
    /// whole fetch; the caller decides whether to degrade.
    pub async fn fetch(&self, handle: &str) -> Result<AccountProfile, ApiError> {
        let data = self.gateway.get_profile(handle).await?;
        let posts = self
            .gateway
            .get_recent_activity(&data.did, self.config.posts_limit)
            .await?;

        debug!("Fetched profile {} with {} posts", data.handle, posts.len());
        Ok(build_profile(data, posts, Utc::now()))
    }
}

/// Assemble a profile snapshot, deriving `joined_at` and `last_posted_at`.
pub fn build_profile(data: ProfileData, posts: Vec<Post>, now: DateTime<Utc>) -> AccountProfile {
    let earliest_post = posts.iter().map(|post| post.created_at).min();
    let latest_post = posts.iter().map(|post| post.created_at).max();

    AccountProfile {
        display_name: data
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| data.handle.clone()),
        id: data.did,
        handle: data.handle,
        bio: data.description.unwrap_or_default(),
        avatar_ref: data.avatar,
        follower_count: data.followers_count.unwrap_or(0),
        following_count: data.follows_count.unwrap_or(0),
        post_count: data.posts_count.unwrap_or(0),
        joined_at: data.indexed_at.or(earliest_post).unwrap_or(now),
        last_posted_at: latest_post,
        recent_posts: posts,
    }
}

pub mod api_usage_stats;
pub mod bluesky_client;
pub mod config;
pub mod error;
pub mod follower_aggregator;
pub mod interaction_detector;
pub mod message_generator;
pub mod model;
pub mod notifier;
pub mod profile_fetcher;
pub mod rate_limit_tracker;
pub mod retry_policy;
pub mod session_gateway;
pub mod social_client;

#[cfg(test)]
mod tests;

pub use api_usage_stats::{ApiUsageSnapshot, ApiUsageStats, NoopStats, StatsObserver};
pub use bluesky_client::BlueskyClient;
pub use config::BlueSparkConfig;
pub use error::{ApiError, ErrorKind};
pub use follower_aggregator::{AggregatorConfig, FollowerAggregator};
pub use interaction_detector::{InteractionConfig, InteractionDetector, InteractionUpdate};
pub use message_generator::{MessageGenerator, OpenRouterClient, Tone, WelcomeDrafter};
pub use model::{
    AccountId, AccountProfile, Credentials, EnrichmentStatus, FollowerRecord, InteractionResult,
    PaginationCursor, Post, Session,
};
pub use notifier::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use profile_fetcher::{ProfileFetcher, ProfileFetcherConfig};
pub use rate_limit_tracker::{RateLimitStatus, RateLimitTracker};
pub use retry_policy::{RetryConfig, RetryPolicy};
pub use session_gateway::{SessionGateway, SessionState};
pub use social_client::{ApiResponse, ResponseMetadata, SocialClient, TransportError};

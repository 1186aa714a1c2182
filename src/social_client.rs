//! Seam between the resilience layer and the social-network transport

use crate::model::{
    AccountId, Credentials, FollowersPage, PaginationCursor, Post, ProfileData, Session,
};
use crate::rate_limit_tracker::reset_delay;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Response headers relevant to throttling, keyed by lower-case name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    headers: HashMap<String, String>,
}

impl ResponseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|value| value.trim())
    }

    /// Wait hint from `retry-after`, falling back to `ratelimit-reset`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .or_else(|| {
                self.header("ratelimit-reset")
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(reset_delay)
            })
    }
}

/// Successful collaborator response together with its metadata
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub metadata: ResponseMetadata,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn with_metadata(data: T, metadata: ResponseMetadata) -> Self {
        Self { data, metadata }
    }
}

/// Failure reported by the transport, before classification
#[derive(Debug, Clone)]
pub struct TransportError {
    /// HTTP status, absent for connection-level failures
    pub status: Option<u16>,
    pub message: String,
    pub metadata: ResponseMetadata,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "Network error: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<ApiResponse<T>, TransportError>;

/// Social-network operations the resilience layer builds on
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> TransportResult<Session>;

    async fn get_profile(&self, session: &Session, actor: &str) -> TransportResult<ProfileData>;

    async fn get_followers(
        &self,
        session: &Session,
        actor: &str,
        limit: usize,
        cursor: Option<&PaginationCursor>,
    ) -> TransportResult<FollowersPage>;

    async fn get_recent_activity(
        &self,
        session: &Session,
        account: &AccountId,
        limit: usize,
    ) -> TransportResult<Vec<Post>>;

    async fn create_post(&self, session: &Session, text: &str) -> TransportResult<()>;
}

//! Session ownership and the single path for authenticated calls
//!
//! Every authenticated operation goes through [`SessionGateway`]: it checks
//! the session, applies proactive throttling, counts the call, runs it under
//! the retry policy, and feeds response metadata to the rate-limit tracker.

use crate::api_usage_stats::{record_api_call, StatsObserver};
use crate::error::{ApiError, ErrorKind};
use crate::model::{AccountId, Credentials, FollowersPage, PaginationCursor, Post, ProfileData, Session};
use crate::rate_limit_tracker::RateLimitTracker;
use crate::retry_policy::RetryPolicy;
use crate::social_client::{SocialClient, TransportError, TransportResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Endpoint name used to scope follower-listing cursors
pub const FOLLOWERS_ENDPOINT: &str = "app.bsky.graph.getFollowers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A login or resume call is in flight
    Authenticating,
    Authenticated(Session),
    Expired,
    LoggedOut,
}

struct GatewayState {
    state: SessionState,
    // Credentials the live session was created with
    credentials: Option<Credentials>,
    // Bumped on every successful login
    generation: u64,
}

pub struct SessionGateway {
    client: Arc<dyn SocialClient>,
    retry: RetryPolicy,
    rate_limits: RateLimitTracker,
    stats: Arc<dyn StatsObserver>,
    inner: Mutex<GatewayState>,
    login_lock: tokio::sync::Mutex<()>,
}

impl SessionGateway {
    pub fn new(
        client: Arc<dyn SocialClient>,
        retry: RetryPolicy,
        rate_limits: RateLimitTracker,
        stats: Arc<dyn StatsObserver>,
    ) -> Self {
        Self {
            client,
            retry,
            rate_limits,
            stats,
            inner: Mutex::new(GatewayState {
                state: SessionState::Unauthenticated,
                credentials: None,
                generation: 0,
            }),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    /// Pure state check, no network call.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.inner.lock().state, SessionState::Authenticated(_))
    }

    pub fn current_session(&self) -> Option<Session> {
        match &self.inner.lock().state {
            SessionState::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    /// Interactive login. A single attempt: repeated failures against the
    /// auth endpoint only earn harsher throttling.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session, ApiError> {
        let credentials = Credentials {
            identifier: identifier.to_string(),
            password: secret.to_string(),
        };
        self.serialized_login(&credentials, false).await
    }

    /// Resume from stored credentials, under the retry policy.
    pub async fn resume_session(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        self.serialized_login(credentials, true).await
    }

    pub fn logout(&self) {
        let mut inner = self.inner.lock();
        if let SessionState::Authenticated(session) = &inner.state {
            info!("Logging out {}", session.handle);
        }
        inner.state = SessionState::LoggedOut;
        inner.credentials = None;
    }

    async fn serialized_login(
        &self,
        credentials: &Credentials,
        with_retry: bool,
    ) -> Result<Session, ApiError> {
        let seen_generation = self.inner.lock().generation;
        let _guard = self.login_lock.lock().await;

        let previous = {
            let mut inner = self.inner.lock();
            // Someone else logged in with the same credentials while we waited
            if inner.generation != seen_generation
                && inner.credentials.as_ref().is_some_and(|live| {
                    live.identifier == credentials.identifier
                        && live.password == credentials.password
                })
            {
                if let SessionState::Authenticated(session) = &inner.state {
                    debug!("Coalesced login for {}", credentials.identifier);
                    return Ok(session.clone());
                }
            }
            std::mem::replace(&mut inner.state, SessionState::Authenticating)
        };

        let result = if with_retry {
            self.retry
                .execute("Resume session", || self.attempt_login(credentials))
                .await
        } else {
            self.attempt_login(credentials).await
        };

        let mut inner = self.inner.lock();
        match result {
            Ok(session) => {
                info!("🔑 Authenticated as {} ({})", session.handle, session.did);
                inner.state = SessionState::Authenticated(session.clone());
                inner.credentials = Some(credentials.clone());
                inner.generation += 1;
                Ok(session)
            }
            Err(e) => {
                error!("Login failed for {}: {}", credentials.identifier, e);
                inner.state = previous;
                Err(e)
            }
        }
    }

    async fn attempt_login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        self.rate_limits.check_quota()?;
        self.rate_limits.pace().await;
        record_api_call(self.stats.as_ref());

        match self.client.login(credentials).await {
            Ok(response) => {
                self.rate_limits.admit(&response.metadata)?;
                Ok(response.data)
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    fn classify(&self, error: TransportError) -> ApiError {
        let classified = ApiError::classify(error);
        if let ApiError::RateLimited { retry_after, .. } = &classified {
            self.rate_limits.record_rate_limited(*retry_after);
        }
        classified
    }

    fn require_session(&self) -> Result<Session, ApiError> {
        self.current_session().ok_or_else(|| {
            ApiError::Authentication("Not authenticated. Please log in first.".to_string())
        })
    }

    fn mark_expired(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Authenticated(_)) {
            warn!("Session rejected by remote, marking as expired");
            inner.state = SessionState::Expired;
        }
    }

    /// Run one authenticated operation through throttling, accounting and retry.
    async fn authenticated<T, F, Fut>(
        &self,
        label: &str,
        max_attempts: u32,
        operation: F,
    ) -> Result<T, ApiError>
    where
        F: Fn(Arc<dyn SocialClient>, Session) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let operation = &operation;
        let initial_delay = self.retry.config().initial_delay;

        let result = self
            .retry
            .execute_with(label, max_attempts, initial_delay, move || async move {
                let session = self.require_session()?;
                self.rate_limits.check_quota()?;
                self.rate_limits.pace().await;
                record_api_call(self.stats.as_ref());

                match operation(self.client.clone(), session).await {
                    Ok(response) => {
                        self.rate_limits.admit(&response.metadata)?;
                        Ok(response.data)
                    }
                    Err(e) => Err(self.classify(e)),
                }
            })
            .await;

        if let Err(e) = &result {
            if e.kind() == ErrorKind::Authentication {
                self.mark_expired();
            }
        }
        result
    }

    pub async fn get_profile(&self, actor: &str) -> Result<ProfileData, ApiError> {
        let attempts = self.retry.config().max_attempts;
        self.authenticated(
            &format!("Get profile for {actor}"),
            attempts,
            move |client, session| {
                let actor = actor.to_string();
                async move { client.get_profile(&session, &actor).await }
            },
        )
        .await
    }

    /// Fetch one page of followers. A cursor issued for another listing is
    /// rejected before any network call.
    pub async fn get_followers(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&PaginationCursor>,
    ) -> Result<FollowersPage, ApiError> {
        if let Some(cursor) = cursor {
            if !cursor.is_scoped_to(FOLLOWERS_ENDPOINT, actor) {
                return Err(ApiError::Client {
                    status: 400,
                    message: format!("Pagination cursor was not issued for followers of {actor}"),
                });
            }
        }

        let attempts = self.retry.config().max_attempts;
        self.authenticated(
            &format!("Get followers for {actor}"),
            attempts,
            move |client, session| {
                let actor = actor.to_string();
                let cursor = cursor.cloned();
                async move {
                    client
                        .get_followers(&session, &actor, limit, cursor.as_ref())
                        .await
                }
            },
        )
        .await
    }

    pub async fn get_recent_activity(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<Post>, ApiError> {
        let attempts = self.retry.config().max_attempts;
        self.authenticated(
            &format!("Get posts for {account}"),
            attempts,
            move |client, session| {
                let account = account.clone();
                async move { client.get_recent_activity(&session, &account, limit).await }
            },
        )
        .await
    }

    /// Publish a post. Not retried, so a timed-out success is never duplicated.
    pub async fn create_post(&self, text: &str) -> Result<(), ApiError> {
        self.authenticated("Create post", 1, move |client, session| {
            let text = text.to_string();
            async move { client.create_post(&session, &text).await }
        })
        .await
    }
}

use super::fakes::{
    did, fast_retry, harness, harness_with, logged_in, BrokenStats, FakeSocialClient,
    RecordingNotifier,
};
use crate::error::{ApiError, ErrorKind};
use crate::model::{Credentials, PaginationCursor};
use crate::rate_limit_tracker::RateLimitTracker;
use crate::retry_policy::RetryPolicy;
use crate::session_gateway::{SessionGateway, SessionState, FOLLOWERS_ENDPOINT};
use crate::social_client::{ResponseMetadata, TransportError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_starts_unauthenticated() {
    let harness = harness();
    assert_eq!(harness.gateway.state(), SessionState::Unauthenticated);
    assert!(!harness.gateway.is_authenticated());
    assert!(harness.gateway.current_session().is_none());
}

#[tokio::test]
async fn test_calls_require_session() {
    let harness = harness();

    let result = harness.gateway.get_profile("alice.test").await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
    assert_eq!(harness.client.count_calls("getProfile"), 0);
}

#[tokio::test]
async fn test_login_authenticates() {
    let harness = harness();

    let session = harness.gateway.login("alice.test", "secret").await.unwrap();

    assert_eq!(session.did, did("alice.test"));
    assert!(harness.gateway.is_authenticated());
    assert_eq!(
        harness.gateway.state(),
        SessionState::Authenticated(session.clone())
    );
    assert_eq!(harness.gateway.current_session(), Some(session));
    assert_eq!(harness.stats.snapshot().bluesky_api_calls, 1);
}

#[tokio::test]
async fn test_interactive_login_is_not_retried() {
    let client = FakeSocialClient::new();
    client
        .login_results
        .lock()
        .push_back(Err(TransportError::status(503, "Service Unavailable")));
    let harness = harness_with(client, fast_retry());

    let result = harness.gateway.login("alice.test", "secret").await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::TransientService);
    assert_eq!(harness.client.login_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(harness.gateway.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_login_rate_limited_reports_wait() {
    let client = FakeSocialClient::new();
    let metadata = ResponseMetadata::new().with_header("retry-after", "120");
    client
        .login_results
        .lock()
        .push_back(Err(TransportError::status(429, "Too Many Requests").with_metadata(metadata)));
    let harness = harness_with(client, fast_retry());

    let error = harness.gateway.login("alice.test", "secret").await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::RateLimited);
    assert_eq!(
        error.to_string(),
        "Rate limit exceeded. Please wait 2 minutes before trying again."
    );
    assert!(harness.gateway.rate_limits().wait_time().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_resume_session_retries_transient_failures() {
    let client = FakeSocialClient::new();
    client
        .login_results
        .lock()
        .push_back(Err(TransportError::status(502, "Bad Gateway")));
    let harness = harness_with(client, fast_retry());

    let credentials = Credentials {
        identifier: "alice.test".to_string(),
        password: "secret".to_string(),
    };
    let session = harness.gateway.resume_session(&credentials).await.unwrap();

    assert_eq!(session.handle, "alice.test");
    assert_eq!(harness.client.count_calls("login:"), 2);
    assert_eq!(harness.notifier.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_logins_are_coalesced() {
    let client = FakeSocialClient::new();
    *client.login_delay.lock() = Some(Duration::from_millis(50));
    let harness = harness_with(client, fast_retry());

    let (first, second) = tokio::join!(
        harness.gateway.login("alice.test", "secret"),
        harness.gateway.login("alice.test", "secret")
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(harness.client.count_calls("login:"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_login_with_other_password_is_not_coalesced() {
    let client = FakeSocialClient::new();
    *client.login_delay.lock() = Some(Duration::from_millis(50));
    client.login_results.lock().push_back(Ok(()));
    client.login_results.lock().push_back(Err(TransportError::status(
        401,
        "AuthenticationRequired: Invalid identifier or password",
    )));
    let harness = harness_with(client, fast_retry());

    let (first, second) = tokio::join!(
        harness.gateway.login("alice.test", "secret"),
        harness.gateway.login("alice.test", "wrong")
    );

    assert_eq!(first.unwrap().handle, "alice.test");
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Authentication);
    assert_eq!(harness.client.count_calls("login:"), 2);
    // The failed attempt leaves the live session in place
    assert!(harness.gateway.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_state_is_authenticating_while_login_in_flight() {
    let client = FakeSocialClient::new();
    *client.login_delay.lock() = Some(Duration::from_millis(50));
    let harness = harness_with(client, fast_retry());

    let gateway = harness.gateway.clone();
    let handle = tokio::spawn(async move { gateway.login("alice.test", "secret").await });
    tokio::task::yield_now().await;

    assert_eq!(harness.gateway.state(), SessionState::Authenticating);
    handle.await.unwrap().unwrap();
    assert!(harness.gateway.is_authenticated());
}

#[tokio::test]
async fn test_rejected_session_is_marked_expired() {
    let harness = logged_in("alice.test").await;
    harness
        .client
        .fail_feed(&did("bob.test"), TransportError::status(401, "AuthenticationRequired"));

    let result = harness.gateway.get_recent_activity(&did("bob.test"), 10).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
    assert_eq!(harness.gateway.state(), SessionState::Expired);
    assert!(!harness.gateway.is_authenticated());
    assert_eq!(harness.client.count_calls("getAuthorFeed"), 1);
}

#[tokio::test]
async fn test_logout() {
    let harness = logged_in("alice.test").await;

    harness.gateway.logout();

    assert_eq!(harness.gateway.state(), SessionState::LoggedOut);
    let result = harness.gateway.get_profile("bob.test").await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_exhausted_quota_blocks_next_call() {
    let harness = logged_in("alice.test").await;
    *harness.client.response_metadata.lock() = ResponseMetadata::new()
        .with_header("ratelimit-limit", "3000")
        .with_header("ratelimit-remaining", "0")
        .with_header("ratelimit-reset", "300");

    // A successful response that spends the last of the quota is rate limited
    let error = harness.gateway.get_profile("bob.test").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RateLimited);
    assert!(error.to_string().contains("5 minutes"));

    // Later calls fail fast without reaching the remote
    let error = harness.gateway.get_profile("carol.test").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RateLimited);
    assert_eq!(harness.client.count_calls("getProfile"), 1);
    assert!(harness.gateway.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_is_counted() {
    let harness = logged_in("alice.test").await;
    harness
        .client
        .transient_profile_failures
        .lock()
        .insert("bob.test".to_string(), 2);

    let profile = harness.gateway.get_profile("bob.test").await.unwrap();

    assert_eq!(profile.handle, "bob.test");
    // login + three profile attempts
    assert_eq!(harness.stats.snapshot().bluesky_api_calls, 4);
}

#[tokio::test]
async fn test_failing_observer_does_not_affect_calls() {
    let client = Arc::new(FakeSocialClient::new());
    let gateway = SessionGateway::new(
        client.clone(),
        RetryPolicy::new(fast_retry(), Arc::new(RecordingNotifier::default())),
        RateLimitTracker::new(100_000),
        Arc::new(BrokenStats),
    );

    gateway.login("alice.test", "secret").await.unwrap();
    let profile = gateway.get_profile("bob.test").await.unwrap();

    assert_eq!(profile.did, did("bob.test"));
}

#[tokio::test]
async fn test_cursor_from_other_listing_is_rejected() {
    let harness = logged_in("alice.test").await;
    let foreign = PaginationCursor::new(FOLLOWERS_ENDPOINT, "bob.test", "c1");

    let error = harness
        .gateway
        .get_followers("alice.test", 25, Some(&foreign))
        .await
        .unwrap_err();

    assert!(matches!(error, ApiError::Client { status: 400, .. }));
    assert_eq!(harness.client.count_calls("getFollowers"), 0);
}

#[tokio::test]
async fn test_cursor_is_forwarded() {
    let harness = logged_in("alice.test").await;
    harness.client.push_page(super::fakes::stubs("f", 0..2), Some("c2"));
    let cursor = PaginationCursor::new(FOLLOWERS_ENDPOINT, "alice.test", "c1");

    let page = harness
        .gateway
        .get_followers("alice.test", 25, Some(&cursor))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.cursor.unwrap().token(), "c2");
    assert_eq!(harness.client.calls().last().unwrap(), "getFollowers:alice.test:c1");
}

#[tokio::test(start_paused = true)]
async fn test_create_post_is_attempted_once() {
    let harness = logged_in("alice.test").await;

    harness.gateway.create_post("hello world").await.unwrap();

    assert_eq!(*harness.client.posts_created.lock(), vec!["hello world".to_string()]);
    assert_eq!(harness.client.count_calls("createPost"), 1);
}

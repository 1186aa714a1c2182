use super::fakes::{did, logged_in, post, profile_data};
use crate::error::ErrorKind;
use crate::profile_fetcher::{build_profile, ProfileFetcher, ProfileFetcherConfig};
use crate::social_client::TransportError;
use chrono::{Duration, TimeZone, Utc};

#[test]
fn test_joined_at_prefers_indexed_at() {
    let now = Utc::now();
    let indexed = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
    let mut data = profile_data("alice.test");
    data.indexed_at = Some(indexed);

    let posts = vec![post(&did("alice.test"), "hello", Duration::days(2))];
    let profile = build_profile(data, posts, now);

    assert_eq!(profile.joined_at, indexed);
}

#[test]
fn test_joined_at_falls_back_to_earliest_post() {
    let now = Utc::now();
    let author = did("alice.test");
    let newest = post(&author, "newest", Duration::days(1));
    let oldest = post(&author, "oldest", Duration::days(30));
    let middle = post(&author, "middle", Duration::days(5));

    let profile = build_profile(
        profile_data("alice.test"),
        vec![newest.clone(), oldest.clone(), middle],
        now,
    );

    assert_eq!(profile.joined_at, oldest.created_at);
    assert_eq!(profile.last_posted_at, Some(newest.created_at));
    assert_eq!(profile.recent_posts.len(), 3);
}

#[test]
fn test_joined_at_defaults_to_now_without_posts() {
    let now = Utc::now();
    let profile = build_profile(profile_data("alice.test"), Vec::new(), now);

    assert_eq!(profile.joined_at, now);
    assert_eq!(profile.last_posted_at, None);
}

#[test]
fn test_missing_fields_default() {
    let mut data = profile_data("alice.test");
    data.display_name = Some("   ".to_string());
    data.description = None;
    data.followers_count = None;
    data.follows_count = None;
    data.posts_count = None;

    let profile = build_profile(data, Vec::new(), Utc::now());

    assert_eq!(profile.display_name, "alice.test");
    assert_eq!(profile.bio, "");
    assert_eq!(profile.follower_count, 0);
    assert_eq!(profile.following_count, 0);
    assert_eq!(profile.post_count, 0);
}

#[tokio::test]
async fn test_fetch_profile_then_posts() {
    let harness = logged_in("me.test").await;
    let author = did("alice.test");
    harness.client.set_feed(
        &author,
        vec![
            post(&author, "one", Duration::hours(1)),
            post(&author, "two", Duration::hours(2)),
        ],
    );
    let fetcher = ProfileFetcher::new(harness.gateway.clone(), ProfileFetcherConfig::default());

    let profile = fetcher.fetch("alice.test").await.unwrap();

    assert_eq!(profile.id, author);
    assert_eq!(profile.display_name, "alice.test display");
    assert_eq!(profile.follower_count, 10);
    assert_eq!(profile.recent_posts.len(), 2);
    assert_eq!(
        harness.client.calls()[1..],
        [
            "getProfile:alice.test".to_string(),
            "getAuthorFeed:did:plc:alice.test".to_string()
        ]
    );
}

#[tokio::test]
async fn test_fetch_respects_posts_limit() {
    let harness = logged_in("me.test").await;
    let author = did("alice.test");
    harness.client.set_feed(
        &author,
        (0..10)
            .map(|i| post(&author, "post", Duration::hours(i)))
            .collect(),
    );
    let fetcher = ProfileFetcher::new(
        harness.gateway.clone(),
        ProfileFetcherConfig { posts_limit: 3 },
    );

    let profile = fetcher.fetch("alice.test").await.unwrap();

    assert_eq!(profile.recent_posts.len(), 3);
}

#[tokio::test]
async fn test_posts_failure_fails_fetch() {
    let harness = logged_in("me.test").await;
    harness
        .client
        .fail_feed(&did("alice.test"), TransportError::status(400, "InvalidRequest"));
    let fetcher = ProfileFetcher::new(harness.gateway.clone(), ProfileFetcherConfig::default());

    let error = fetcher.fetch("alice.test").await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Client);
}

#[tokio::test]
async fn test_profile_failure_skips_posts() {
    let harness = logged_in("me.test").await;
    harness.client.fail_profile("ghost.test");
    let fetcher = ProfileFetcher::new(harness.gateway.clone(), ProfileFetcherConfig::default());

    assert!(fetcher.fetch("ghost.test").await.is_err());
    assert_eq!(harness.client.count_calls("getAuthorFeed"), 0);
}

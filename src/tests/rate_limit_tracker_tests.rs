use crate::error::{ApiError, ErrorKind};
use crate::rate_limit_tracker::{reset_delay, RateLimitTracker};
use crate::social_client::ResponseMetadata;
use chrono::Utc;
use std::time::Duration;

fn envelope(limit: &str, remaining: &str, reset: &str) -> ResponseMetadata {
    ResponseMetadata::new()
        .with_header("RateLimit-Limit", limit)
        .with_header("RateLimit-Remaining", remaining)
        .with_header("RateLimit-Reset", reset)
}

#[test]
fn test_inspect_without_envelope() {
    assert_eq!(RateLimitTracker::inspect(&ResponseMetadata::new()), None);

    let partial = ResponseMetadata::new().with_header("ratelimit-limit", "3000");
    assert_eq!(RateLimitTracker::inspect(&partial), None);

    let garbage = envelope("lots", "some", "soon");
    assert_eq!(RateLimitTracker::inspect(&garbage), None);
}

#[test]
fn test_inspect_converts_reset_to_deadline() {
    let before = Utc::now();
    let status = RateLimitTracker::inspect(&envelope("3000", "2999", "30")).unwrap();

    assert_eq!(status.limit, 3000);
    assert_eq!(status.remaining, 2999);
    assert!(!status.is_exhausted());
    assert!(status.reset_at >= before + chrono::Duration::seconds(30));
    assert!(status.reset_at <= Utc::now() + chrono::Duration::seconds(30));
}

#[test]
fn test_reset_delay_accepts_epoch_seconds() {
    assert_eq!(reset_delay(45), Duration::from_secs(45));

    let in_two_minutes = (Utc::now().timestamp() + 120) as u64;
    let delay = reset_delay(in_two_minutes);
    assert!(delay <= Duration::from_secs(120));
    assert!(delay >= Duration::from_secs(118));

    let in_the_past = (Utc::now().timestamp() - 60) as u64;
    assert_eq!(reset_delay(in_the_past), Duration::ZERO);
}

#[test]
fn test_exhausted_quota_blocks_following_calls() {
    let tracker = RateLimitTracker::default();
    assert!(tracker.check_quota().is_ok());

    let status = tracker.observe(&envelope("100", "0", "120")).unwrap();
    assert!(status.is_exhausted());
    assert_eq!(tracker.last_status(), Some(status));

    let error = tracker.check_quota().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RateLimited);
    match error {
        ApiError::RateLimited {
            reset_at,
            retry_after,
            message,
        } => {
            assert_eq!(reset_at, Some(status.reset_at));
            assert!(retry_after.unwrap() <= Duration::from_secs(120));
            assert!(message.contains("2 minutes"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_remaining_quota_does_not_block() {
    let tracker = RateLimitTracker::default();
    tracker.observe(&envelope("100", "5", "120"));
    assert!(tracker.check_quota().is_ok());
    assert_eq!(tracker.wait_time(), None);
}

#[test]
fn test_record_rate_limited_sets_wait_time() {
    let tracker = RateLimitTracker::default();
    tracker.record_rate_limited(Some(Duration::from_secs(300)));

    let wait = tracker.wait_time().unwrap();
    assert!(wait > Duration::from_secs(295));
    assert!(wait <= Duration::from_secs(300));
    assert!(tracker.check_quota().is_err());
}

#[test]
fn test_later_deadline_wins() {
    let tracker = RateLimitTracker::default();
    tracker.record_rate_limited(Some(Duration::from_secs(600)));
    tracker.record_rate_limited(Some(Duration::from_secs(10)));

    assert!(tracker.wait_time().unwrap() > Duration::from_secs(500));
}

#[test]
fn test_elapsed_deadline_clears() {
    let tracker = RateLimitTracker::default();
    tracker.record_rate_limited(Some(Duration::ZERO));

    assert!(tracker.check_quota().is_ok());
    assert_eq!(tracker.wait_time(), None);
}

#[tokio::test]
async fn test_pace_within_quota_is_immediate() {
    let tracker = RateLimitTracker::new(1000);
    let start = std::time::Instant::now();
    for _ in 0..10 {
        tracker.pace().await;
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_admit_rejects_spent_quota() {
    let tracker = RateLimitTracker::new(600);

    assert!(tracker.admit(&ResponseMetadata::new()).is_ok());
    assert!(tracker.admit(&envelope("3000", "1", "120")).is_ok());
    assert!(tracker.check_quota().is_ok());

    let error = tracker.admit(&envelope("3000", "0", "120")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RateLimited);
    assert!(error.to_string().contains("2 minutes"));
    assert!(tracker.check_quota().is_err());
}

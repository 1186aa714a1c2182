use super::fakes::{did, post};
use crate::api_usage_stats::ApiUsageStats;
use crate::error::{ApiError, ErrorKind};
use crate::message_generator::{
    build_prompt, GeneratedText, MessageGenerator, OpenRouterClient, PromptContext, Tone,
    WelcomeDrafter,
};
use crate::model::{AccountProfile, ProfileStub};
use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use std::sync::Arc;

fn profile(handle: &str, bio: &str, posts: &[&str]) -> AccountProfile {
    let mut profile = AccountProfile::from_stub(&ProfileStub {
        did: did(handle),
        handle: handle.to_string(),
        display_name: None,
        avatar: None,
    });
    profile.bio = bio.to_string();
    profile.recent_posts = posts
        .iter()
        .enumerate()
        .map(|(i, text)| post(&profile.id, text, Duration::hours(i as i64)))
        .collect();
    profile
}

#[derive(Default)]
struct CannedGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageGenerator for CannedGenerator {
    async fn generate_text(&self, context: &PromptContext) -> Result<GeneratedText, ApiError> {
        self.prompts.lock().push(context.prompt.clone());
        Ok(GeneratedText {
            text: "Welcome aboard!".to_string(),
            tokens_used: 87,
        })
    }
}

#[test]
fn test_tone_parsing() {
    assert_eq!("warm".parse::<Tone>(), Ok(Tone::Warm));
    assert_eq!("Professional".parse::<Tone>(), Ok(Tone::Professional));
    assert_eq!("HUMOROUS".parse::<Tone>(), Ok(Tone::Humorous));
    assert_eq!("enthusiastic".parse::<Tone>(), Ok(Tone::Enthusiastic));
    assert!("sarcastic".parse::<Tone>().is_err());
    assert_eq!(Tone::default(), Tone::Warm);
    assert_eq!(Tone::Professional.to_string(), "professional");
}

#[test]
fn test_prompt_describes_both_profiles() {
    let user = profile("me.test", "I write Rust", &["borrowck tips", "async pitfalls"]);
    let follower = profile("new.test", "", &["hello bluesky"]);

    let context = build_prompt(&user, &follower, Tone::Humorous, None);

    assert!(context.prompt.contains("Name: me.test"));
    assert!(context.prompt.contains("Bio: I write Rust"));
    assert!(context.prompt.contains("borrowck tips"));
    assert!(context.prompt.contains("Name: new.test"));
    assert!(context.prompt.contains("Bio: No bio"));
    assert!(context.prompt.contains("Use a humorous tone."));
    assert!(!context.prompt.contains("Additional instructions"));
}

#[test]
fn test_prompt_limits_posts_and_appends_instructions() {
    let user = profile("me.test", "bio", &["p1", "p2", "p3", "p4"]);
    let follower = profile("new.test", "bio", &[]);

    let context = build_prompt(&user, &follower, Tone::Warm, Some("  mention rust meetups "));

    assert!(context.prompt.contains("p3"));
    assert!(!context.prompt.contains("p4"));
    assert!(context
        .prompt
        .ends_with("Additional instructions: mention rust meetups"));
}

#[tokio::test]
async fn test_drafter_records_tokens() {
    let generator = Arc::new(CannedGenerator::default());
    let stats = Arc::new(ApiUsageStats::new());
    let drafter = WelcomeDrafter::new(generator.clone(), stats.clone());

    let message = drafter
        .draft(
            &profile("me.test", "bio", &[]),
            &profile("new.test", "bio", &[]),
            Tone::Enthusiastic,
            None,
        )
        .await
        .unwrap();

    assert_eq!(message, "Welcome aboard!");
    assert_eq!(stats.snapshot().openrouter_tokens, 87);
    assert_eq!(generator.prompts.lock().len(), 1);
}

#[tokio::test]
async fn test_missing_api_key_is_authentication_error() {
    let client = OpenRouterClient::new(
        None,
        "test/model".to_string(),
        std::time::Duration::from_secs(5),
    )
    .unwrap();

    let error = client
        .generate_text(&PromptContext {
            prompt: "hi".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Authentication);
}

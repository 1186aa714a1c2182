//! Welcome-message drafting on top of a text-generation collaborator

use crate::api_usage_stats::{record_tokens, StatsObserver};
use crate::error::ApiError;
use crate::model::AccountProfile;
use crate::social_client::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Posts per profile included in a prompt
const PROMPT_POSTS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tone {
    #[default]
    Warm,
    Professional,
    Humorous,
    Enthusiastic,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tone::Warm => "warm",
            Tone::Professional => "professional",
            Tone::Humorous => "humorous",
            Tone::Enthusiastic => "enthusiastic",
        };
        f.write_str(name)
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warm" => Ok(Tone::Warm),
            "professional" => Ok(Tone::Professional),
            "humorous" => Ok(Tone::Humorous),
            "enthusiastic" => Ok(Tone::Enthusiastic),
            other => Err(format!("unknown tone '{other}'")),
        }
    }
}

/// Opaque input handed to the text generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate_text(&self, context: &PromptContext) -> Result<GeneratedText, ApiError>;
}

/// Chat-completions client for OpenRouter
pub struct OpenRouterClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("BlueSpark/0.1")
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl MessageGenerator for OpenRouterClient {
    async fn generate_text(&self, context: &PromptContext) -> Result<GeneratedText, ApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ApiError::Authentication(
                "OpenRouter API key is not configured".to_string(),
            ));
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &context.prompt,
            }],
            temperature: 0.7,
            max_tokens: 500,
            top_p: 1.0,
            stream: false,
        };

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::classify(TransportError::network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::classify(TransportError::status(
                status.as_u16(),
                format!("OpenRouter API error: {body}"),
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Unknown(format!("Invalid OpenRouter response: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ApiError::Unknown("Invalid API response format".to_string()))?;
        let tokens_used = body.usage.map(|usage| usage.total_tokens).unwrap_or(0);

        debug!("Generated {} chars using {} tokens", text.len(), tokens_used);
        Ok(GeneratedText {
            text: text.trim().to_string(),
            tokens_used,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

/// Drafts welcome messages for new followers
pub struct WelcomeDrafter {
    generator: Arc<dyn MessageGenerator>,
    stats: Arc<dyn StatsObserver>,
}

impl WelcomeDrafter {
    pub fn new(generator: Arc<dyn MessageGenerator>, stats: Arc<dyn StatsObserver>) -> Self {
        Self { generator, stats }
    }

    pub async fn draft(
        &self,
        user: &AccountProfile,
        follower: &AccountProfile,
        tone: Tone,
        extra_instructions: Option<&str>,
    ) -> Result<String, ApiError> {
        let context = build_prompt(user, follower, tone, extra_instructions);
        let generated = self.generator.generate_text(&context).await?;
        record_tokens(self.stats.as_ref(), generated.tokens_used);

        info!("✉️  Drafted welcome message for {}", follower.handle);
        Ok(generated.text)
    }
}

pub fn build_prompt(
    user: &AccountProfile,
    follower: &AccountProfile,
    tone: Tone,
    extra_instructions: Option<&str>,
) -> PromptContext {
    let mut prompt = format!(
        "User Profile:\n{}\n\nNew Follower Profile:\n{}\n\n\
         Generate a friendly, personalized welcome message and conversation starter \
         based on shared interests or complementary topics.\n\
         Use a {tone} tone.\n\
         Keep it casual and authentic, under 300 characters.",
        describe_profile(user),
        describe_profile(follower),
    );
    if let Some(extra) = extra_instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra.trim());
    }
    PromptContext { prompt }
}

fn describe_profile(profile: &AccountProfile) -> String {
    let bio = if profile.bio.is_empty() {
        "No bio"
    } else {
        profile.bio.as_str()
    };
    let posts = profile
        .recent_posts
        .iter()
        .take(PROMPT_POSTS)
        .map(|post| post.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Name: {}\nBio: {}\nRecent posts: {}",
        profile.display_name, bio, posts
    )
}

use anyhow::{Context, Result};
use bluespark::{
    AccountId, ApiUsageStats, BlueSparkConfig, BlueskyClient, FollowerAggregator, FollowerRecord,
    InteractionDetector, Notifier, OpenRouterClient, ProfileFetcher, RateLimitTracker,
    RetryPolicy, SessionGateway, StatsObserver, Tone, TracingNotifier, WelcomeDrafter,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "bluespark",
    version = "0.1.0",
    about = "Welcome your newest Bluesky followers"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent followers with their enrichment status
    Followers {
        /// Account whose followers to list (defaults to the logged-in account)
        handle: Option<String>,

        /// Number of followers to return
        #[arg(short, long)]
        count: Option<usize>,

        /// Followers requested per listing page
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Check which recent followers interacted with the account this week
    Interactions {
        /// Account to check (defaults to the logged-in account)
        handle: Option<String>,

        /// Number of followers to check
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Draft a welcome message for a follower
    Draft {
        /// Handle of the follower to welcome
        follower: String,

        /// warm, professional, humorous or enthusiastic
        #[arg(short, long, default_value = "warm")]
        tone: Tone,

        /// Extra instructions appended to the prompt
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Publish a post
    Post {
        text: String,
    },

    /// Show or reset API usage statistics
    Stats {
        #[arg(long)]
        reset: bool,
    },
}

fn setup_tracing() {
    if std::env::var("TOKIO_CONSOLE").is_ok() {
        console_subscriber::init();
        return;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bluespark=debug"));

    fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::SystemTime)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_level(true)
        .init();
}

struct App {
    config: BlueSparkConfig,
    gateway: Arc<SessionGateway>,
    stats: Arc<ApiUsageStats>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    fn build(config: BlueSparkConfig, stats: Arc<ApiUsageStats>) -> Result<Self> {
        let client = BlueskyClient::new(&config.service_url, config.http_timeout)
            .context("Failed to build Bluesky client")?;
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        let observer: Arc<dyn StatsObserver> = stats.clone();

        let gateway = Arc::new(SessionGateway::new(
            Arc::new(client),
            RetryPolicy::new(config.retry.clone(), notifier.clone()),
            RateLimitTracker::new(config.requests_per_minute),
            observer,
        ));

        Ok(Self {
            config,
            gateway,
            stats,
            notifier,
        })
    }

    async fn login(&self) -> Result<bluespark::Session> {
        let credentials = self.config.credentials()?;
        let session = self.gateway.resume_session(&credentials).await?;
        Ok(session)
    }

    fn fetcher(&self) -> ProfileFetcher {
        ProfileFetcher::new(self.gateway.clone(), self.config.profile.clone())
    }

    fn aggregator(&self) -> FollowerAggregator {
        FollowerAggregator::new(
            self.gateway.clone(),
            self.fetcher(),
            self.notifier.clone(),
            self.config.aggregator.clone(),
        )
    }

    async fn followers(
        &self,
        handle: Option<String>,
        count: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<()> {
        let session = self.login().await?;
        let handle = handle.unwrap_or(session.handle);
        let aggregator = self.aggregator();

        let followers = aggregator
            .load_followers_with(
                &handle,
                count.unwrap_or(aggregator.config().target_count),
                batch_size.unwrap_or(aggregator.config().batch_size),
            )
            .await?;

        for (index, follower) in followers.iter().enumerate() {
            print_follower(index + 1, follower);
        }
        Ok(())
    }

    async fn interactions(&self, handle: Option<String>, count: Option<usize>) -> Result<()> {
        let session = self.login().await?;
        let (primary, handle) = match handle {
            Some(handle) => {
                let profile = self.gateway.get_profile(&handle).await?;
                (profile.did, handle)
            }
            None => (session.did.clone(), session.handle.clone()),
        };

        let aggregator = self.aggregator();
        let followers = aggregator
            .load_followers_with(
                &handle,
                count.unwrap_or(aggregator.config().target_count),
                aggregator.config().batch_size,
            )
            .await?;

        let handles: HashMap<AccountId, String> = followers
            .iter()
            .map(|f| (f.profile.id.clone(), f.profile.handle.clone()))
            .collect();
        let ids: Vec<AccountId> = followers.iter().map(|f| f.profile.id.clone()).collect();

        let token = CancellationToken::new();
        let ctrl_c_token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling interaction scan");
                ctrl_c_token.cancel();
            }
        });

        let detector = InteractionDetector::new(self.gateway.clone(), self.config.interactions.clone());
        let updates = detector.spawn_scan(primary, ids, token.clone());

        let progress_bar = ProgressBar::new(followers.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} followers ({eta})")?
                .progress_chars("#>-"),
        );

        let mut interacted = 0usize;
        while let Ok(update) = updates.recv_async().await {
            progress_bar.inc(1);
            if update.result.has_interacted {
                interacted += 1;
                let handle = handles
                    .get(&update.follower_id)
                    .map(String::as_str)
                    .unwrap_or(update.follower_id.as_str());
                let when = update
                    .result
                    .last_interaction_at
                    .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default();
                progress_bar.println(format!("💬 @{handle} interacted with you ({when})"));
            }
        }
        progress_bar.finish_and_clear();

        if token.is_cancelled() {
            warn!("Interaction scan cancelled");
        }
        info!(
            "{} of {} followers interacted in the last week",
            interacted,
            followers.len()
        );
        Ok(())
    }

    async fn draft(&self, follower: &str, tone: Tone, instructions: Option<&str>) -> Result<()> {
        let session = self.login().await?;
        let fetcher = self.fetcher();
        let user = fetcher.fetch(&session.handle).await?;
        let follower = fetcher.fetch(follower).await?;

        let generator = OpenRouterClient::new(
            self.config.openrouter_api_key.clone(),
            self.config.openrouter_model.clone(),
            self.config.http_timeout,
        )
        .context("Failed to build OpenRouter client")?;
        let observer: Arc<dyn StatsObserver> = self.stats.clone();
        let drafter = WelcomeDrafter::new(Arc::new(generator), observer);

        let message = drafter.draft(&user, &follower, tone, instructions).await?;
        println!("{message}");
        Ok(())
    }

    async fn post(&self, text: &str) -> Result<()> {
        self.login().await?;
        self.gateway.create_post(text).await?;
        info!("Post published");
        Ok(())
    }
}

fn print_follower(position: usize, follower: &FollowerRecord) {
    let profile = &follower.profile;
    let marker = if follower.is_degraded() { "⚠️ " } else { "" };
    let last_post = profile
        .last_posted_at
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "never".to_string());

    println!(
        "{position:>3}. {marker}{} (@{}) followers={} following={} posts={} last_post={}",
        profile.display_name,
        profile.handle,
        profile.follower_count,
        profile.following_count,
        profile.post_count,
        last_post
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BlueSparkConfig::from_env()?;
    setup_tracing();

    let args = Args::parse();

    let stats = Arc::new(ApiUsageStats::load(&config.stats_file).unwrap_or_else(|e| {
        warn!("Failed to load API stats, starting fresh: {}", e);
        ApiUsageStats::new()
    }));

    if let Command::Stats { reset } = &args.command {
        if *reset {
            stats.reset();
            stats.save(&config.stats_file).await?;
        }
        let snapshot = stats.snapshot();
        println!("Bluesky API calls: {}", snapshot.bluesky_api_calls);
        println!("OpenRouter tokens: {}", snapshot.openrouter_tokens);
        return Ok(());
    }

    let stats_file = config.stats_file.clone();
    let app = App::build(config, stats.clone())?;

    let result = match args.command {
        Command::Followers {
            handle,
            count,
            batch_size,
        } => app.followers(handle, count, batch_size).await,
        Command::Interactions { handle, count } => app.interactions(handle, count).await,
        Command::Draft {
            follower,
            tone,
            instructions,
        } => app.draft(&follower, tone, instructions.as_deref()).await,
        Command::Post { text } => app.post(&text).await,
        Command::Stats { .. } => Ok(()),
    };

    if let Err(e) = stats.save(&stats_file).await {
        error!("Failed to save API stats: {}", e);
    }

    result
}

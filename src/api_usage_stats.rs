//! API usage accounting
//!
//! Observers are fire-and-forget: a failing observer is logged and ignored,
//! it never changes the outcome of the call being counted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::debug;

/// Observer of outbound API usage
pub trait StatsObserver: Send + Sync {
    fn on_api_call_made(&self) -> anyhow::Result<()>;

    fn on_tokens_used(&self, tokens: u64) -> anyhow::Result<()>;
}

/// Notify an observer, swallowing its failure.
pub(crate) fn record_api_call(observer: &dyn StatsObserver) {
    if let Err(e) = observer.on_api_call_made() {
        debug!("Stats observer failed to record API call: {}", e);
    }
}

pub(crate) fn record_tokens(observer: &dyn StatsObserver, tokens: u64) {
    if let Err(e) = observer.on_tokens_used(tokens) {
        debug!("Stats observer failed to record {} tokens: {}", tokens, e);
    }
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsObserver for NoopStats {
    fn on_api_call_made(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_tokens_used(&self, _tokens: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Snapshot of usage counters, also the persisted format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUsageSnapshot {
    pub bluesky_api_calls: u64,
    pub openrouter_tokens: u64,
}

/// In-memory usage counters
#[derive(Debug, Default)]
pub struct ApiUsageStats {
    bluesky_api_calls: AtomicU64,
    openrouter_tokens: AtomicU64,
}

impl ApiUsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ApiUsageSnapshot) -> Self {
        Self {
            bluesky_api_calls: AtomicU64::new(snapshot.bluesky_api_calls),
            openrouter_tokens: AtomicU64::new(snapshot.openrouter_tokens),
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> ApiUsageSnapshot {
        ApiUsageSnapshot {
            bluesky_api_calls: self.bluesky_api_calls.load(AtomicOrdering::Relaxed),
            openrouter_tokens: self.openrouter_tokens.load(AtomicOrdering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.bluesky_api_calls.store(0, AtomicOrdering::Relaxed);
        self.openrouter_tokens.store(0, AtomicOrdering::Relaxed);
    }

    /// Load persisted counters; a missing file starts from zero.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No stats file at {}, starting fresh", path.display());
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let snapshot: ApiUsageSnapshot = serde_json::from_str(&json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Save state to disk
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl StatsObserver for ApiUsageStats {
    fn on_api_call_made(&self) -> anyhow::Result<()> {
        self.bluesky_api_calls.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    fn on_tokens_used(&self, tokens: u64) -> anyhow::Result<()> {
        self.openrouter_tokens
            .fetch_add(tokens, AtomicOrdering::Relaxed);
        Ok(())
    }
}

//! Error taxonomy for remote API access
//!
//! Every failure that crosses a component boundary is an [`ApiError`]. The
//! variant decides how the failure is treated: retried, surfaced to the user,
//! or absorbed as a degraded record.

use crate::social_client::TransportError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`ApiError`], looking through wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    RateLimited,
    TransientService,
    Client,
    Unknown,
    Enrichment,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Session missing, rejected or expired
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Quota exhausted; `message` is meant to be shown to the user as is
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
        reset_at: Option<DateTime<Utc>>,
    },

    /// Upstream outage (502/503/504)
    #[error("Service unavailable ({status}): {message}")]
    TransientService { status: u16, message: String },

    /// Bad request, not found, or any other 4xx
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Unexpected failure: {0}")]
    Unknown(String),

    /// Failure enriching a single follower or interaction check
    #[error("Enrichment failed for {subject}: {source}")]
    Enrichment {
        subject: String,
        #[source]
        source: Box<ApiError>,
    },

    /// Last error seen once the retry budget ran out
    #[error("{label} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// Build a rate-limit error from an optional wait hint.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let reset_at = retry_after
            .and_then(|wait| chrono::Duration::from_std(wait).ok())
            .map(|wait| Utc::now() + wait);

        ApiError::RateLimited {
            message: rate_limit_message(retry_after),
            retry_after,
            reset_at,
        }
    }

    /// Same as [`ApiError::rate_limited`] but anchored to an absolute deadline.
    pub fn rate_limited_until(reset_at: DateTime<Utc>) -> Self {
        let retry_after = (reset_at - Utc::now()).to_std().ok();
        ApiError::RateLimited {
            message: rate_limit_message(retry_after),
            retry_after,
            reset_at: Some(reset_at),
        }
    }

    /// Map a collaborator failure onto the taxonomy.
    pub fn classify(err: TransportError) -> Self {
        let Some(status) = err.status else {
            return ApiError::Unknown(err.message);
        };

        let lowered = err.message.to_lowercase();
        match status {
            401 => ApiError::Authentication(err.message),
            400 if lowered.contains("expiredtoken") || lowered.contains("invalidtoken") => {
                ApiError::Authentication(err.message)
            }
            429 => ApiError::rate_limited(err.metadata.retry_after()),
            502..=504 => ApiError::TransientService {
                status,
                message: err.message,
            },
            400..=499 => ApiError::Client {
                status,
                message: err.message,
            },
            _ => ApiError::Unknown(format!("HTTP {status}: {}", err.message)),
        }
    }

    pub fn enrichment(subject: impl Into<String>, source: ApiError) -> Self {
        ApiError::Enrichment {
            subject: subject.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Authentication(_) => ErrorKind::Authentication,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::TransientService { .. } => ErrorKind::TransientService,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Unknown(_) => ErrorKind::Unknown,
            ApiError::Enrichment { .. } => ErrorKind::Enrichment,
            ApiError::Exhausted { source, .. } => source.kind(),
        }
    }

    /// Whether the retry policy may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientService | ErrorKind::Unknown
        )
    }

    /// Wait hint carried by a rate-limit error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after, .. } => *retry_after,
            ApiError::Exhausted { source, .. } | ApiError::Enrichment { source, .. } => {
                source.retry_after()
            }
            _ => None,
        }
    }
}

/// Human-readable wait estimate, rounded up to whole minutes.
pub fn rate_limit_message(retry_after: Option<Duration>) -> String {
    match retry_after {
        Some(wait) => {
            let minutes = wait.as_secs().div_ceil(60).max(1);
            let unit = if minutes == 1 { "minute" } else { "minutes" };
            format!("Rate limit exceeded. Please wait {minutes} {unit} before trying again.")
        }
        None => "Rate limit exceeded. Please wait a few minutes before trying again.".to_string(),
    }
}

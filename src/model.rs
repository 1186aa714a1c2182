//! Data model shared by the fetching and detection components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable account identifier (a DID). Matching always goes through this,
/// never through the mutable handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Authenticated handle bound to one account
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub did: AccountId,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Stored login credentials used to resume a session
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Raw profile as returned by the profile endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub did: AccountId,
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub followers_count: Option<u64>,
    pub follows_count: Option<u64>,
    pub posts_count: Option<u64>,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Bare follower entry from the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStub {
    pub did: AccountId,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

/// Continuation token bound to the listing that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    endpoint: &'static str,
    account: String,
    token: String,
}

impl PaginationCursor {
    pub fn new(endpoint: &'static str, account: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint,
            account: account.into(),
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True when this cursor was issued by `endpoint` for `account`.
    pub fn is_scoped_to(&self, endpoint: &str, account: &str) -> bool {
        self.endpoint == endpoint && self.account == account
    }
}

/// One page of the follower listing
#[derive(Debug, Clone, PartialEq)]
pub struct FollowersPage {
    pub items: Vec<ProfileStub>,
    pub cursor: Option<PaginationCursor>,
}

/// A post from an account's recent activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub uri: String,
    pub author: AccountId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    /// Author of the parent post when this post is a reply
    pub reply_target: Option<AccountId>,
    /// Accounts mentioned through rich-text facets
    #[serde(default)]
    pub mentions: Vec<AccountId>,
    /// Authors of other posts in the thread this post belongs to
    #[serde(default)]
    pub thread_participants: Vec<AccountId>,
    #[serde(default)]
    pub is_repost: bool,
}

impl Post {
    /// Whether this post mentions or replies to `target`.
    pub fn references(&self, target: &AccountId) -> bool {
        self.reply_target.as_ref() == Some(target)
            || self.mentions.contains(target)
            || self.thread_participants.contains(target)
            || text_references(&self.text, target.as_str())
    }
}

/// Case-insensitive exact identifier match. An occurrence only counts when it
/// is not followed by another identifier character, so `did:plc:ab` does not
/// match inside `did:plc:abc`.
pub fn text_references(text: &str, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }

    let haystack = text.to_lowercase();
    let needle = id.to_lowercase();
    let mut from = 0;

    while let Some(pos) = haystack[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_identifier_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_identifier_char(c));
        if before_ok && after_ok {
            return true;
        }
        from = start + needle.chars().next().map_or(1, char::len_utf8);
    }

    false
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ':' | '_' | '-' | '.')
}

/// Immutable snapshot of an account, re-fetched rather than updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: AccountId,
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_ref: Option<String>,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub joined_at: DateTime<Utc>,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub recent_posts: Vec<Post>,
}

impl AccountProfile {
    /// Minimal profile built from a listing stub when enrichment failed.
    pub fn from_stub(stub: &ProfileStub) -> Self {
        Self {
            id: stub.did.clone(),
            handle: stub.handle.clone(),
            display_name: stub.handle.clone(),
            bio: String::new(),
            avatar_ref: None,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            joined_at: Utc::now(),
            last_posted_at: None,
            recent_posts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Complete,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerRecord {
    pub profile: AccountProfile,
    pub status: EnrichmentStatus,
}

impl FollowerRecord {
    pub fn complete(profile: AccountProfile) -> Self {
        Self {
            profile,
            status: EnrichmentStatus::Complete,
        }
    }

    pub fn degraded(stub: &ProfileStub) -> Self {
        Self {
            profile: AccountProfile::from_stub(stub),
            status: EnrichmentStatus::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == EnrichmentStatus::Degraded
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResult {
    pub has_interacted: bool,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl InteractionResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            has_interacted: true,
            last_interaction_at: Some(timestamp),
        }
    }
}

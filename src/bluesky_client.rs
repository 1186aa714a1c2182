//! XRPC implementation of [`SocialClient`] for Bluesky-compatible services

use crate::model::{
    AccountId, Credentials, FollowersPage, PaginationCursor, Post, ProfileData, ProfileStub,
    Session,
};
use crate::session_gateway::FOLLOWERS_ENDPOINT;
use crate::social_client::{
    ApiResponse, ResponseMetadata, SocialClient, TransportError, TransportResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Largest page the XRPC list endpoints accept
const MAX_PAGE_LIMIT: usize = 100;

const FORWARDED_HEADERS: [&str; 4] = [
    "ratelimit-limit",
    "ratelimit-remaining",
    "ratelimit-reset",
    "retry-after",
];

const MENTION_FEATURE: &str = "app.bsky.richtext.facet#mention";
const REPOST_REASON: &str = "app.bsky.feed.defs#reasonRepost";

pub struct BlueskyClient {
    client: Client,
    service_url: Url,
}

impl BlueskyClient {
    pub fn new(service_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = format!("{}/", service_url.trim_end_matches('/'));
        let service_url = Url::parse(&base)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent("BlueSpark/0.1")
            .build()?;

        Ok(Self {
            client,
            service_url,
        })
    }

    fn endpoint(&self, nsid: &str) -> Result<Url, TransportError> {
        self.service_url
            .join(&format!("xrpc/{nsid}"))
            .map_err(|e| TransportError::network(format!("Invalid endpoint {nsid}: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        nsid: &str,
        query: &[(&str, String)],
    ) -> TransportResult<T> {
        let request = self
            .client
            .get(self.endpoint(nsid)?)
            .bearer_auth(&session.access_jwt)
            .query(query);
        Self::send(request, nsid).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        session: Option<&Session>,
        nsid: &str,
        body: &B,
    ) -> TransportResult<T> {
        let mut request = self.client.post(self.endpoint(nsid)?).json(body);
        if let Some(session) = session {
            request = request.bearer_auth(&session.access_jwt);
        }
        Self::send(request, nsid).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder, nsid: &str) -> TransportResult<T> {
        debug!("XRPC call {}", nsid);
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::network(format!("{nsid}: {e}")))?;
        Self::read_response(response).await
    }

    async fn read_response<T: DeserializeOwned>(response: Response) -> TransportResult<T> {
        let metadata = metadata_from_headers(response.headers());
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = xrpc_error_message(&body).unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
            return Err(TransportError::status(status.as_u16(), message).with_metadata(metadata));
        }

        let data = response.json::<T>().await.map_err(|e| {
            TransportError::status(status.as_u16(), format!("Invalid response body: {e}"))
                .with_metadata(metadata.clone())
        })?;

        Ok(ApiResponse::with_metadata(data, metadata))
    }
}

#[async_trait]
impl SocialClient for BlueskyClient {
    async fn login(&self, credentials: &Credentials) -> TransportResult<Session> {
        let body = CreateSessionRequest {
            identifier: &credentials.identifier,
            password: &credentials.password,
        };
        let response: ApiResponse<CreateSessionResponse> = self
            .post(None, "com.atproto.server.createSession", &body)
            .await?;

        let session = response.data;
        Ok(ApiResponse::with_metadata(
            Session {
                did: AccountId::new(session.did),
                handle: session.handle,
                access_jwt: session.access_jwt,
                refresh_jwt: session.refresh_jwt,
            },
            response.metadata,
        ))
    }

    async fn get_profile(&self, session: &Session, actor: &str) -> TransportResult<ProfileData> {
        let response: ApiResponse<ProfileView> = self
            .get(
                session,
                "app.bsky.actor.getProfile",
                &[("actor", actor.to_string())],
            )
            .await?;

        Ok(ApiResponse::with_metadata(
            response.data.into(),
            response.metadata,
        ))
    }

    async fn get_followers(
        &self,
        session: &Session,
        actor: &str,
        limit: usize,
        cursor: Option<&PaginationCursor>,
    ) -> TransportResult<FollowersPage> {
        let mut query = vec![
            ("actor", actor.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE_LIMIT).to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.token().to_string()));
        }

        let response: ApiResponse<FollowersView> =
            self.get(session, FOLLOWERS_ENDPOINT, &query).await?;

        let view = response.data;
        let page = FollowersPage {
            items: view.followers.into_iter().map(ProfileStub::from).collect(),
            cursor: view
                .cursor
                .filter(|token| !token.is_empty())
                .map(|token| PaginationCursor::new(FOLLOWERS_ENDPOINT, actor, token)),
        };
        Ok(ApiResponse::with_metadata(page, response.metadata))
    }

    async fn get_recent_activity(
        &self,
        session: &Session,
        account: &AccountId,
        limit: usize,
    ) -> TransportResult<Vec<Post>> {
        let query = [
            ("actor", account.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE_LIMIT).to_string()),
        ];
        let response: ApiResponse<AuthorFeedView> = self
            .get(session, "app.bsky.feed.getAuthorFeed", &query)
            .await?;

        let posts = response
            .data
            .feed
            .into_iter()
            .map(Post::from)
            .collect();
        Ok(ApiResponse::with_metadata(posts, response.metadata))
    }

    async fn create_post(&self, session: &Session, text: &str) -> TransportResult<()> {
        let body = CreateRecordRequest {
            repo: session.did.as_str(),
            collection: "app.bsky.feed.post",
            record: PostRecordBody {
                kind: "app.bsky.feed.post",
                text,
                created_at: Utc::now().to_rfc3339(),
            },
        };
        let response: ApiResponse<IgnoredAny> = self
            .post(Some(session), "com.atproto.repo.createRecord", &body)
            .await?;
        Ok(ApiResponse::with_metadata((), response.metadata))
    }
}

pub(crate) fn metadata_from_headers(headers: &HeaderMap) -> ResponseMetadata {
    let mut metadata = ResponseMetadata::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            metadata.insert(name, value);
        }
    }
    metadata
}

pub(crate) fn xrpc_error_message(body: &str) -> Option<String> {
    let parsed: XrpcErrorBody = serde_json::from_str(body).ok()?;
    match (parsed.error, parsed.message) {
        (Some(error), Some(message)) => Some(format!("{error}: {message}")),
        (Some(error), None) => Some(error),
        (None, Some(message)) => Some(message),
        (None, None) => None,
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    record: PostRecordBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecordBody<'a> {
    #[serde(rename = "$type")]
    kind: &'a str,
    text: &'a str,
    created_at: String,
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileView {
    did: String,
    handle: String,
    display_name: Option<String>,
    description: Option<String>,
    avatar: Option<String>,
    followers_count: Option<u64>,
    follows_count: Option<u64>,
    posts_count: Option<u64>,
    indexed_at: Option<String>,
}

impl From<ProfileView> for ProfileData {
    fn from(view: ProfileView) -> Self {
        ProfileData {
            did: AccountId::new(view.did),
            handle: view.handle,
            display_name: view.display_name,
            description: view.description,
            avatar: view.avatar,
            followers_count: view.followers_count,
            follows_count: view.follows_count,
            posts_count: view.posts_count,
            indexed_at: parse_timestamp(view.indexed_at.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActorView {
    did: String,
    handle: String,
    display_name: Option<String>,
    avatar: Option<String>,
}

impl From<ActorView> for ProfileStub {
    fn from(view: ActorView) -> Self {
        ProfileStub {
            did: AccountId::new(view.did),
            handle: view.handle,
            display_name: view.display_name,
            avatar: view.avatar,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowersView {
    pub(crate) followers: Vec<ActorView>,
    pub(crate) cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorFeedView {
    pub(crate) feed: Vec<FeedViewPost>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedViewPost {
    post: PostView,
    reply: Option<ReplyRef>,
    reason: Option<TypedRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: AuthorRef,
    record: PostRecord,
    indexed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    did: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(default)]
    text: String,
    created_at: Option<String>,
    #[serde(default)]
    facets: Vec<Facet>,
}

#[derive(Debug, Deserialize)]
struct Facet {
    #[serde(default)]
    features: Vec<FacetFeature>,
}

#[derive(Debug, Deserialize)]
struct FacetFeature {
    #[serde(rename = "$type")]
    kind: Option<String>,
    did: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyRef {
    parent: Option<ReplyTarget>,
    root: Option<ReplyTarget>,
}

/// Parent or root of a reply; blocked or deleted posts carry no author
#[derive(Debug, Deserialize)]
struct ReplyTarget {
    author: Option<AuthorRef>,
}

#[derive(Debug, Deserialize)]
struct TypedRef {
    #[serde(rename = "$type")]
    kind: Option<String>,
}

impl From<FeedViewPost> for Post {
    fn from(item: FeedViewPost) -> Self {
        let FeedViewPost { post, reply, reason } = item;

        let mentions = post
            .record
            .facets
            .iter()
            .flat_map(|facet| facet.features.iter())
            .filter(|feature| feature.kind.as_deref() == Some(MENTION_FEATURE))
            .filter_map(|feature| feature.did.as_deref().map(AccountId::new))
            .collect();

        let reply_author = |target: Option<&ReplyTarget>| {
            target
                .and_then(|t| t.author.as_ref())
                .map(|author| AccountId::new(author.did.clone()))
        };
        let reply_target = reply_author(reply.as_ref().and_then(|r| r.parent.as_ref()));
        let thread_participants = reply_author(reply.as_ref().and_then(|r| r.root.as_ref()))
            .into_iter()
            .collect();

        let is_repost = reason
            .as_ref()
            .and_then(|r| r.kind.as_deref())
            .is_some_and(|kind| kind == REPOST_REASON);

        Post {
            created_at: parse_timestamp(post.record.created_at.as_deref())
                .unwrap_or(post.indexed_at),
            uri: post.uri,
            author: AccountId::new(post.author.did),
            text: post.record.text,
            indexed_at: post.indexed_at,
            reply_target,
            mentions,
            thread_participants,
            is_repost,
        }
    }
}

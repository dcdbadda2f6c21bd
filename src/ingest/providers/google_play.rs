// src/ingest/providers/google_play.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;

use crate::error::FeedError;
use crate::ingest::clean_text;
use crate::ingest::types::{Page, PagedFeed};
use crate::model::{FeedEntry, Item, MalformedItem, Target};

pub const DEFAULT_BASE: &str = "https://androidpublisher.googleapis.com";
const FEED: &str = "google_play";

/// Supplies the OAuth bearer token used for a target's API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self, target: &Target) -> Result<String, FeedError>;
}

/// Uses the credentials stored on the target as the bearer token.
pub struct TargetCredentials;

#[async_trait]
impl TokenSource for TargetCredentials {
    async fn bearer_token(&self, target: &Target) -> Result<String, FeedError> {
        target
            .credentials
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FeedError::Credentials(format!("target {} has no credentials", target.id)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsList {
    #[serde(default)]
    reviews: Vec<Review>,
    token_pagination: Option<TokenPagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPagination {
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Review {
    review_id: Option<String>,
    author_name: Option<String>,
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Comment {
    user_comment: Option<UserComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserComment {
    text: Option<String>,
    last_modified: Option<Timestamp>,
    star_rating: Option<i64>,
    device: Option<String>,
    android_os_version: Option<u32>,
    app_version_code: Option<i64>,
    app_version_name: Option<String>,
    device_metadata: Option<DeviceMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceMetadata {
    product_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Timestamp {
    seconds: Int64,
    #[serde(default)]
    nanos: u32,
}

// int64 fields are JSON strings in Google APIs, but accept numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64 {
    Num(i64),
    Str(String),
}

impl Int64 {
    fn value(&self) -> Option<i64> {
        match self {
            Int64::Num(n) => Some(*n),
            Int64::Str(s) => s.trim().parse().ok(),
        }
    }
}

fn to_entry(r: Review) -> FeedEntry {
    let Some(id) = r.review_id.filter(|s| !s.trim().is_empty()) else {
        return Err(MalformedItem::new(None, "missing review id"));
    };
    let Some(c) = r.comments.into_iter().find_map(|c| c.user_comment) else {
        return Err(MalformedItem::new(Some(id), "review has no user comment"));
    };
    let Some(posted_at) = c
        .last_modified
        .as_ref()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.seconds.value()?, t.nanos))
    else {
        return Err(MalformedItem::new(Some(id), "missing or invalid lastModified"));
    };
    let rating = match c.star_rating {
        Some(r @ 1..=5) => r as u8,
        other => {
            return Err(MalformedItem::new(
                Some(id),
                format!("star rating out of range: {other:?}"),
            ))
        }
    };

    let device = c
        .device_metadata
        .and_then(|m| m.product_name)
        .filter(|n| !n.is_empty())
        .or(c.device);

    Ok(Item {
        id,
        author: r.author_name.unwrap_or_default(),
        body: clean_text(c.text.as_deref().unwrap_or_default()),
        rating,
        posted_at: Some(posted_at),
        app_version: c.app_version_name,
        build_number: c.app_version_code,
        device,
        os_level: c.android_os_version,
    })
}

/// Parse one `reviews.list` response page.
pub fn parse_page(body: &str) -> Result<Page, FeedError> {
    let t0 = std::time::Instant::now();
    let list: ReviewsList = serde_json::from_str(body).map_err(|e| FeedError::Decode {
        feed: FEED,
        reason: e.to_string(),
    })?;
    let next_token = list
        .token_pagination
        .and_then(|p| p.next_page_token)
        .filter(|t| !t.is_empty());
    let entries = list.reviews.into_iter().map(to_entry).collect();
    histogram!("relay_parse_ms", "feed" => FEED).record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(Page {
        entries,
        next_token,
    })
}

/// Google Play Developer API `reviews.list` (newest first, paginated).
pub struct GooglePlayFeed {
    client: reqwest::Client,
    base: String,
    tokens: Arc<dyn TokenSource>,
}

impl GooglePlayFeed {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base: DEFAULT_BASE.to_string(),
            tokens: Arc::new(TargetCredentials),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }
}

#[async_trait]
impl PagedFeed for GooglePlayFeed {
    async fn fetch_page(&self, target: &Target, token: Option<&str>) -> Result<Page, FeedError> {
        let bearer = self.tokens.bearer_token(target).await?;
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/reviews",
            self.base, target.app_id
        );

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(lang) = target.locale.as_deref().filter(|l| !l.trim().is_empty()) {
            query.push(("translationLanguage", lang));
        }
        if let Some(t) = token {
            query.push(("token", t));
        }
        tracing::debug!(target_id = %target.id, paged = token.is_some(), "fetching google play reviews");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(&query)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FeedError::Status {
                feed: FEED,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        parse_page(&body)
    }

    fn name(&self) -> &'static str {
        FEED
    }
}

// src/ingest/providers/app_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;
use crate::ingest::clean_text;
use crate::ingest::types::OrdinalFeed;
use crate::model::{FeedEntry, Item, MalformedItem, Target};

pub const DEFAULT_BASE: &str = "https://itunes.apple.com";
const DEFAULT_COUNTRY: &str = "us";
const FEED: &str = "app_store";

#[derive(Debug, Deserialize)]
struct Rss {
    feed: Feed,
}

// Entries stay raw so one oddly shaped entry cannot fail the whole page.
#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Value,
}

#[derive(Debug, Deserialize)]
struct Label {
    label: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<Label>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<Label>,
    author: Option<Author>,
    #[serde(rename = "im:version")]
    version: Option<Label>,
    #[serde(rename = "im:rating")]
    rating: Option<Label>,
    title: Option<Label>,
    content: Option<Label>,
    updated: Option<Label>,
}

fn label(l: Option<Label>) -> Option<String> {
    l.map(|l| l.label)
}

fn to_entry(e: Entry) -> FeedEntry {
    let Some(id) = label(e.id).filter(|s| !s.trim().is_empty()) else {
        return Err(MalformedItem::new(None, "missing review id"));
    };

    let rating_raw = label(e.rating).unwrap_or_default();
    let rating = match rating_raw.trim().parse::<u8>() {
        Ok(r) if (1..=5).contains(&r) => r,
        _ => {
            return Err(MalformedItem::new(
                Some(id),
                format!("unparseable rating {rating_raw:?}"),
            ))
        }
    };

    let title = label(e.title).unwrap_or_default();
    let content = label(e.content).unwrap_or_default();
    let posted_at = label(e.updated)
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Item {
        id,
        author: label(e.author.and_then(|a| a.name)).unwrap_or_default(),
        body: clean_text(&format!("{title}\n{content}")),
        rating,
        posted_at,
        app_version: label(e.version),
        build_number: None,
        device: None,
        os_level: None,
    })
}

fn decode_entry(raw: Value) -> FeedEntry {
    let id = raw
        .pointer("/id/label")
        .and_then(Value::as_str)
        .map(str::to_string);
    match serde_json::from_value::<Entry>(raw) {
        Ok(e) => to_entry(e),
        Err(e) => Err(MalformedItem::new(id, format!("unexpected entry shape: {e}"))),
    }
}

/// Parse the customer-reviews JSON feed into entries, newest first.
pub fn parse_feed(body: &str) -> Result<Vec<FeedEntry>, FeedError> {
    let t0 = std::time::Instant::now();
    let rss: Rss = serde_json::from_str(body).map_err(|e| FeedError::Decode {
        feed: FEED,
        reason: e.to_string(),
    })?;
    let entries = match rss.feed.entry {
        Value::Null => Vec::new(),
        Value::Array(v) => v.into_iter().map(decode_entry).collect(),
        // The feed collapses a single entry into a bare object.
        one => vec![decode_entry(one)],
    };
    histogram!("relay_parse_ms", "feed" => FEED).record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

/// App Store customer reviews (most recent first, one page).
pub struct AppStoreFeed {
    client: reqwest::Client,
    base: String,
}

impl AppStoreFeed {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base: DEFAULT_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, target: &Target) -> String {
        let country = target
            .locale
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COUNTRY)
            .to_ascii_lowercase();
        format!(
            "{}/{}/rss/customerreviews/id={}/sortBy=mostRecent/json",
            self.base, country, target.app_id
        )
    }
}

#[async_trait]
impl OrdinalFeed for AppStoreFeed {
    async fn fetch(&self, target: &Target) -> Result<Vec<FeedEntry>, FeedError> {
        let url = self.url(target);
        tracing::debug!(target_id = %target.id, %url, "fetching app store feed");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FeedError::Status {
                feed: FEED,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        FEED
    }
}

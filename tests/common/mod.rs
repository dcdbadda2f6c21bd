// tests/common/mod.rs
//
// Scripted in-process feeds and target builders shared by integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use review_relay::error::FeedError;
use review_relay::ingest::types::{FeedSource, OrdinalFeed, Page, PagedFeed};
use review_relay::model::{FeedEntry, MalformedItem};
use review_relay::registry::store::{JsonFileStore, TargetStore, WatermarkStore};
use review_relay::{Destination, FeedKind, Item, Target, Watermark};

pub fn item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        author: "Ann".to_string(),
        body: format!("review {id}"),
        rating: 5,
        posted_at: None,
        app_version: Some("1.0".to_string()),
        build_number: None,
        device: None,
        os_level: None,
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

pub fn timed(id: &str, secs: i64) -> FeedEntry {
    Ok(Item {
        posted_at: Some(at(secs)),
        ..item(id)
    })
}

pub fn malformed(id: &str) -> FeedEntry {
    Err(MalformedItem::new(Some(id.to_string()), "unparseable rating"))
}

pub fn ordinal_entries(ids: &[&str]) -> Vec<FeedEntry> {
    ids.iter().map(|id| Ok(item(id))).collect()
}

pub fn target(id: &str, kind: FeedKind, dest: i64) -> Target {
    Target {
        id: id.to_string(),
        kind,
        app_id: format!("app-{id}"),
        destination: Some(Destination(dest)),
        display_name: Some(format!("App {id}")),
        locale: None,
        credentials: match kind {
            FeedKind::GooglePlay => Some("token".to_string()),
            FeedKind::AppStore => None,
        },
        watermark: None,
        last_polled_at: None,
    }
}

pub async fn store_with(targets: Vec<Target>) -> Arc<dyn TargetStore> {
    let store = JsonFileStore::in_memory();
    for t in targets {
        store.insert(t).await.expect("insert target");
    }
    Arc::new(store)
}

pub async fn watermark_of(store: &Arc<dyn TargetStore>, id: &str) -> Option<Watermark> {
    store.read_watermark(id).await.expect("read watermark")
}

pub async fn polled_at(store: &Arc<dyn TargetStore>, id: &str) -> Option<DateTime<Utc>> {
    store
        .find(id)
        .await
        .expect("find target")
        .expect("target exists")
        .last_polled_at
}

/// Returns the same page on every fetch; the page can be swapped between polls.
#[derive(Default)]
pub struct ScriptedOrdinal {
    pub entries: Mutex<Vec<FeedEntry>>,
    pub fetches: AtomicUsize,
    pub failing: AtomicBool,
}

impl ScriptedOrdinal {
    pub fn new(entries: Vec<FeedEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(entries),
            ..Default::default()
        })
    }

    pub fn set(&self, entries: Vec<FeedEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    /// While set, every fetch fails as an undecodable response.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrdinalFeed for ScriptedOrdinal {
    async fn fetch(&self, _target: &Target) -> Result<Vec<FeedEntry>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Decode {
                feed: "scripted_ordinal",
                reason: "truncated body".to_string(),
            });
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    fn name(&self) -> &'static str {
        "scripted_ordinal"
    }
}

/// Serves pages in order, linked by tokens "p1", "p2", ...; records each
/// requested token. A request for the token set with `fail_on` fails
/// without consuming a page.
#[derive(Default)]
pub struct ScriptedPaged {
    pub pages: Mutex<VecDeque<Vec<FeedEntry>>>,
    pub requested: Mutex<Vec<Option<String>>>,
    pub fail_token: Mutex<Option<String>>,
}

impl ScriptedPaged {
    pub fn new(pages: Vec<Vec<FeedEntry>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            requested: Mutex::default(),
            fail_token: Mutex::default(),
        })
    }

    pub fn requested(&self) -> Vec<Option<String>> {
        self.requested.lock().unwrap().clone()
    }

    /// Replace whatever pages are left.
    pub fn set_pages(&self, pages: Vec<Vec<FeedEntry>>) {
        *self.pages.lock().unwrap() = pages.into();
    }

    pub fn fail_on(&self, token: Option<&str>) {
        *self.fail_token.lock().unwrap() = token.map(str::to_string);
    }
}

#[async_trait]
impl PagedFeed for ScriptedPaged {
    async fn fetch_page(&self, _target: &Target, token: Option<&str>) -> Result<Page, FeedError> {
        let mut requested = self.requested.lock().unwrap();
        requested.push(token.map(str::to_string));
        let served = requested.len();
        if token.is_some() && self.fail_token.lock().unwrap().as_deref() == token {
            return Err(FeedError::Decode {
                feed: "scripted_paged",
                reason: "truncated body".to_string(),
            });
        }
        let mut pages = self.pages.lock().unwrap();
        let entries = pages.pop_front().unwrap_or_default();
        let next_token = (!pages.is_empty()).then(|| format!("p{served}"));
        Ok(Page {
            entries,
            next_token,
        })
    }

    fn name(&self) -> &'static str {
        "scripted_paged"
    }
}

pub fn ordinal_source(feed: &Arc<ScriptedOrdinal>) -> FeedSource {
    FeedSource::Ordinal(feed.clone())
}

pub fn paged_source(feed: &Arc<ScriptedPaged>, max_pages: usize) -> FeedSource {
    FeedSource::Paged {
        feed: feed.clone(),
        max_pages,
    }
}

// src/ingest/types.rs
use std::sync::Arc;

use crate::error::FeedError;
use crate::model::{FeedEntry, Target};

/// One page of a paginated feed. The token is only meaningful within the
/// poll that received it and is never persisted.
#[derive(Debug, Default)]
pub struct Page {
    pub entries: Vec<FeedEntry>,
    pub next_token: Option<String>,
}

/// Single-shot feed, newest first.
#[async_trait::async_trait]
pub trait OrdinalFeed: Send + Sync {
    async fn fetch(&self, target: &Target) -> Result<Vec<FeedEntry>, FeedError>;
    fn name(&self) -> &'static str;
}

/// Paginated feed, newest first. `token` is `None` for the first page.
#[async_trait::async_trait]
pub trait PagedFeed: Send + Sync {
    async fn fetch_page(&self, target: &Target, token: Option<&str>) -> Result<Page, FeedError>;
    fn name(&self) -> &'static str;
}

/// The closed set of feed shapes a reconciler can walk.
#[derive(Clone)]
pub enum FeedSource {
    /// Identifier cursor over a single newest-first page.
    Ordinal(Arc<dyn OrdinalFeed>),
    /// Timestamp cursor over at most `max_pages` pages.
    Paged {
        feed: Arc<dyn PagedFeed>,
        max_pages: usize,
    },
}

impl FeedSource {
    pub fn name(&self) -> &'static str {
        match self {
            FeedSource::Ordinal(feed) => feed.name(),
            FeedSource::Paged { feed, .. } => feed.name(),
        }
    }
}

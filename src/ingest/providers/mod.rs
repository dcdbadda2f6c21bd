// src/ingest/providers/mod.rs
pub mod app_store;
pub mod google_play;

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::ingest::types::FeedSource;
use crate::model::FeedKind;

/// Pick the feed implementation (and its dedup strategy) for a kind.
pub fn feed_source(kind: FeedKind, cfg: &RelayConfig, client: reqwest::Client) -> FeedSource {
    match kind {
        FeedKind::AppStore => FeedSource::Ordinal(Arc::new(
            app_store::AppStoreFeed::new(client).with_base_url(cfg.app_store_base.as_str()),
        )),
        FeedKind::GooglePlay => FeedSource::Paged {
            feed: Arc::new(
                google_play::GooglePlayFeed::new(client)
                    .with_base_url(cfg.google_play_base.as_str()),
            ),
            max_pages: cfg.max_pages,
        },
    }
}

// src/ingest/paged.rs
//! Timestamp-cursor dedup over a bounded page walk.
//!
//! Pages arrive newest first. The first item at or below the stored cursor
//! ends the walk; nothing after it is emitted and no further page is fetched.
//! Without a cursor only the newest item goes out, which seeds the cursor.

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, warn};

use super::types::PagedFeed;
use super::{Emitter, PollReport};
use crate::error::PollError;
use crate::model::{Target, Watermark};
use crate::registry::store::WatermarkStore;

pub(crate) async fn run<S>(
    feed: &dyn PagedFeed,
    max_pages: usize,
    target: &Target,
    stored: Option<&Watermark>,
    emitter: &Emitter<'_>,
    store: &S,
) -> Result<PollReport, PollError>
where
    S: WatermarkStore + ?Sized,
{
    let cursor = stored.and_then(Watermark::cursor);
    if stored.is_some() && cursor.is_none() {
        warn!(target_id = %target.id, "watermark is not a timestamp cursor, treating as unset");
    }

    let mut report = PollReport::default();
    let mut newest: Option<DateTime<Utc>> = None;
    let mut token: Option<String> = None;

    'walk: while report.pages < max_pages {
        let page = feed.fetch_page(target, token.as_deref()).await?;
        report.pages += 1;
        counter!("relay_pages_fetched_total").increment(1);
        debug!(
            target_id = %target.id,
            page = report.pages,
            entries = page.entries.len(),
            "page fetched"
        );

        for entry in &page.entries {
            let item = match entry {
                Ok(item) => item,
                Err(bad) => {
                    report.malformed += 1;
                    counter!("relay_items_malformed_total").increment(1);
                    warn!(target_id = %target.id, error = %bad, "skipping malformed item");
                    continue;
                }
            };
            let Some(at) = item.posted_at else {
                report.malformed += 1;
                counter!("relay_items_malformed_total").increment(1);
                warn!(target_id = %target.id, item = %item.id, "skipping item without timestamp");
                continue;
            };

            if cursor.is_some_and(|c| at <= c) {
                debug!(target_id = %target.id, "reached already delivered items");
                break 'walk;
            }

            emitter.emit(item).await?;
            report.emitted += 1;
            newest = newest.max(Some(at));

            if cursor.is_none() {
                // First poll: one item is enough to seed the cursor.
                break 'walk;
            }
        }

        if cursor.is_none() {
            break;
        }
        match page.next_token {
            Some(t) if !t.is_empty() => token = Some(t),
            _ => break,
        }
    }

    let advanced = match (cursor, newest) {
        (Some(c), Some(n)) if n > c => Some(Watermark::Cursor(n)),
        (None, Some(n)) => Some(Watermark::Cursor(n)),
        _ => None,
    };
    store
        .advance(&target.id, advanced.clone(), Utc::now())
        .await?;
    report.advanced_to = advanced;
    report.wrote = true;
    Ok(report)
}

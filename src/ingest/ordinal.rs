// src/ingest/ordinal.rs
//! Identifier-cursor dedup for single-page, newest-first feeds.

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use super::types::OrdinalFeed;
use super::{Emitter, PollReport};
use crate::error::PollError;
use crate::model::{entry_id, FeedEntry, Item, MalformedItem, Target, Watermark};
use crate::registry::store::WatermarkStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalOutcome {
    /// Feed was empty; nothing to do.
    Empty,
    /// First poll: watermark seeded, nothing emitted.
    Seeded,
    /// Stored identifier no longer in the feed: reseeded, nothing emitted.
    Reseeded,
    /// Newer items found.
    Advanced,
    /// Newest item is the stored one.
    Unchanged,
}

/// What a poll over one page should emit and where the cursor goes.
#[derive(Debug)]
pub struct OrdinalPlan<'a> {
    pub outcome: OrdinalOutcome,
    /// Items to emit, in feed order.
    pub emit: Vec<&'a Item>,
    pub malformed: Vec<&'a MalformedItem>,
    pub advance_to: Option<String>,
}

impl<'a> OrdinalPlan<'a> {
    fn nothing(outcome: OrdinalOutcome) -> Self {
        Self {
            outcome,
            emit: Vec::new(),
            malformed: Vec::new(),
            advance_to: None,
        }
    }

    fn seed(outcome: OrdinalOutcome, newest: &str) -> Self {
        Self {
            advance_to: Some(newest.to_string()),
            ..Self::nothing(outcome)
        }
    }
}

/// Pure planning step: same entries and same watermark give the same plan.
pub fn plan<'a>(entries: &'a [FeedEntry], stored: Option<&str>) -> OrdinalPlan<'a> {
    let Some(newest) = entries.iter().find_map(entry_id) else {
        return OrdinalPlan::nothing(OrdinalOutcome::Empty);
    };
    let Some(stored) = stored else {
        return OrdinalPlan::seed(OrdinalOutcome::Seeded, newest);
    };
    let Some(pos) = entries.iter().position(|e| entry_id(e) == Some(stored)) else {
        return OrdinalPlan::seed(OrdinalOutcome::Reseeded, newest);
    };

    // Everything above `pos` is new, including malformed entries without an id.
    let mut plan = OrdinalPlan::nothing(OrdinalOutcome::Advanced);
    for entry in &entries[..pos] {
        match entry {
            Ok(item) => plan.emit.push(item),
            Err(bad) => plan.malformed.push(bad),
        }
    }
    if newest == stored {
        plan.outcome = OrdinalOutcome::Unchanged;
    } else {
        plan.advance_to = Some(newest.to_string());
    }
    plan
}

pub(crate) async fn run<S>(
    feed: &dyn OrdinalFeed,
    target: &Target,
    stored: Option<&Watermark>,
    emitter: &Emitter<'_>,
    store: &S,
) -> Result<PollReport, PollError>
where
    S: WatermarkStore + ?Sized,
{
    let entries = feed.fetch(target).await?;
    counter!("relay_pages_fetched_total").increment(1);

    let stored_id = stored.and_then(Watermark::last_seen);
    if stored.is_some() && stored_id.is_none() {
        warn!(target_id = %target.id, "watermark is not an identifier cursor, reseeding");
    }

    let plan = plan(&entries, stored_id);
    match plan.outcome {
        OrdinalOutcome::Seeded => info!(target_id = %target.id, "first poll, seeding watermark"),
        OrdinalOutcome::Reseeded => info!(
            target_id = %target.id,
            stored = stored_id.unwrap_or_default(),
            "stored review left the feed, reseeding watermark"
        ),
        _ => {}
    }

    for bad in &plan.malformed {
        counter!("relay_items_malformed_total").increment(1);
        warn!(target_id = %target.id, error = %bad, "skipping malformed item");
    }

    let mut report = PollReport {
        pages: 1,
        malformed: plan.malformed.len(),
        ..Default::default()
    };
    for item in &plan.emit {
        emitter.emit(item).await?;
        report.emitted += 1;
    }

    if let Some(newest) = plan.advance_to {
        let watermark = Watermark::LastSeen(newest);
        store
            .advance(&target.id, Some(watermark.clone()), Utc::now())
            .await?;
        report.advanced_to = Some(watermark);
        report.wrote = true;
    }
    Ok(report)
}

// src/ingest/mod.rs
//! # Reconciler
//! Turns one feed read into deduplicated emissions plus one watermark write.
//!
//! The feed shape decides the strategy: ordinal feeds dedup by last-seen
//! identifier ([`ordinal`]), paginated feeds by newest timestamp ([`paged`]).
//! Either way the watermark is read once at the start of a poll and written
//! once at the end, after every emitted item was handed to the outbox.

pub mod ordinal;
pub mod paged;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::PollError;
use crate::model::{Destination, Item, Target, Watermark};
use crate::notify::render::render_review;
use crate::notify::{OutboundMessage, Outbox};
use crate::registry::store::{TargetStore, WatermarkStore};
use types::FeedSource;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_polls_total", "Polls started, per feed.");
        describe_counter!(
            "relay_poll_errors_total",
            "Polls abandoned on a feed, store or outbox error."
        );
        describe_counter!(
            "relay_items_emitted_total",
            "Reviews handed to the outbound queue."
        );
        describe_counter!(
            "relay_items_malformed_total",
            "Feed entries skipped because they could not be parsed."
        );
        describe_counter!("relay_pages_fetched_total", "Feed pages fetched.");
        describe_counter!(
            "relay_deliveries_total",
            "Delivery attempts by outcome (ok, rejected, failed)."
        );
        describe_counter!(
            "relay_job_failures_total",
            "Job firings that returned an error or panicked."
        );
        describe_gauge!("relay_scheduled_jobs", "Poll jobs currently scheduled, per kind.");
        describe_histogram!("relay_parse_ms", "Feed response parse time in milliseconds.");
    });
}

/// Decode entities, trim each line, collapse runs of blanks, cap the length.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_BLANKS: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_BLANKS.get_or_init(|| regex::Regex::new(r"[ \t\u{00A0}]+").expect("static regex"));

    let lines: Vec<String> = decoded
        .lines()
        .map(|l| re.replace_all(l, " ").trim().to_string())
        .collect();
    let mut out = lines.join("\n").trim().to_string();

    // Telegram caps messages at 4096 characters; leave room for the header.
    const MAX_CHARS: usize = 3500;
    if out.chars().count() > MAX_CHARS {
        out = out.chars().take(MAX_CHARS).collect();
        out.push('…');
    }
    out
}

/// Outcome of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub emitted: usize,
    pub malformed: usize,
    pub pages: usize,
    /// Watermark written by this poll, if it changed.
    pub advanced_to: Option<Watermark>,
    /// Whether the poll wrote to the watermark store at all.
    pub wrote: bool,
}

/// Renders and hands off items for one target.
pub(crate) struct Emitter<'a> {
    outbox: &'a Outbox,
    target: &'a Target,
    destination: Destination,
}

impl Emitter<'_> {
    pub(crate) async fn emit(&self, item: &Item) -> Result<(), PollError> {
        let text = render_review(item, self.target.name(), self.target.kind.renders_timestamp());
        self.outbox
            .hand_off(OutboundMessage {
                target_id: self.target.id.clone(),
                destination: self.destination,
                text,
            })
            .await
            .map_err(|_| PollError::OutboxClosed)?;
        counter!("relay_items_emitted_total").increment(1);
        debug!(target_id = %self.target.id, item = %item.id, "item emitted");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Reconciler {
    source: FeedSource,
    store: Arc<dyn TargetStore>,
    outbox: Outbox,
}

impl Reconciler {
    pub fn new(source: FeedSource, store: Arc<dyn TargetStore>, outbox: Outbox) -> Self {
        Self {
            source,
            store,
            outbox,
        }
    }

    /// Poll one target: fetch, dedup, emit, advance.
    pub async fn poll(&self, target_id: &str) -> Result<PollReport, PollError> {
        ensure_metrics_described();
        counter!("relay_polls_total", "feed" => self.source.name()).increment(1);

        let res = self.poll_inner(target_id).await;
        match &res {
            Ok(report) => info!(
                target_id,
                feed = self.source.name(),
                emitted = report.emitted,
                malformed = report.malformed,
                pages = report.pages,
                "poll finished"
            ),
            Err(_) => counter!("relay_poll_errors_total").increment(1),
        }
        res
    }

    async fn poll_inner(&self, target_id: &str) -> Result<PollReport, PollError> {
        let Some(target) = self.store.find(target_id).await? else {
            // Unregistered since the last rebuild; the next rebuild drops the job.
            debug!(target_id, "target gone, skipping poll");
            return Ok(PollReport::default());
        };
        let destination = target
            .destination
            .ok_or_else(|| PollError::Invariant(format!("target {target_id} has no destination")))?;
        if target.app_id.trim().is_empty() {
            return Err(PollError::Invariant(format!("target {target_id} has no app id")));
        }

        let stored = self.store.read_watermark(target_id).await?;
        let emitter = Emitter {
            outbox: &self.outbox,
            target: &target,
            destination,
        };

        match &self.source {
            FeedSource::Ordinal(feed) => {
                ordinal::run(feed.as_ref(), &target, stored.as_ref(), &emitter, self.store.as_ref())
                    .await
            }
            FeedSource::Paged { feed, max_pages } => {
                paged::run(
                    feed.as_ref(),
                    *max_pages,
                    &target,
                    stored.as_ref(),
                    &emitter,
                    self.store.as_ref(),
                )
                .await
            }
        }
    }
}

//! Error taxonomy for the poll and delivery paths.

use crate::model::Destination;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("target {0} not found")]
    NotFound(String),

    #[error("target {0} already exists")]
    Duplicate(String),

    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failures of a feed fetch. All of them are transient from the poller's
/// point of view: the poll is abandoned and the next firing retries.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{feed} returned {status}: {body}")]
    Status {
        feed: &'static str,
        status: u16,
        body: String,
    },

    #[error("decoding {feed} response: {reason}")]
    Decode { feed: &'static str, reason: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("outbound queue closed")]
    OutboxClosed,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The sink will never accept messages for this destination again.
    #[error("destination {destination} rejected delivery: {reason}")]
    PermanentReject {
        destination: Destination,
        reason: String,
    },

    #[error("transient delivery failure: {0}")]
    Transient(String),
}

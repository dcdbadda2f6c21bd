//! # Model
//! Targets, watermarks and review items shared by the registry, the
//! reconcilers and the outbound path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed-source kinds. Each kind maps to exactly one dedup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// App Store customer reviews: newest-first, single page, identifier cursor.
    AppStore,
    /// Google Play reviews: newest-first, paginated, timestamp cursor.
    GooglePlay,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::AppStore, FeedKind::GooglePlay];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::AppStore => "app_store",
            FeedKind::GooglePlay => "google_play",
        }
    }

    /// Whether rendered messages carry the review timestamp. The App Store
    /// feed's timestamps are not reliable enough to show.
    pub fn renders_timestamp(self) -> bool {
        matches!(self, FeedKind::GooglePlay)
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque delivery destination (a chat id for the Telegram sink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub i64);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dedup cursor of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Watermark {
    /// Identifier of the newest delivered item (ordinal feeds).
    LastSeen(String),
    /// Timestamp of the newest delivered item (paginated feeds).
    Cursor(DateTime<Utc>),
}

impl Watermark {
    pub fn last_seen(&self) -> Option<&str> {
        match self {
            Watermark::LastSeen(id) => Some(id.as_str()),
            Watermark::Cursor(_) => None,
        }
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::Cursor(ts) => Some(*ts),
            Watermark::LastSeen(_) => None,
        }
    }
}

/// One monitored app plus where its reviews go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: FeedKind,
    /// Package name (Google Play) or numeric app id (App Store).
    pub app_id: String,
    #[serde(default)]
    pub destination: Option<Destination>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Translation language (Google Play) or storefront country (App Store).
    #[serde(default)]
    pub locale: Option<String>,
    /// Feed credentials; only Google Play uses them.
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub watermark: Option<Watermark>,
    #[serde(default)]
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Display name, falling back to the raw app id.
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => &self.app_id,
        }
    }

    /// Whether a poll job should exist for this target.
    pub fn is_eligible(&self) -> bool {
        if self.destination.is_none() || self.app_id.trim().is_empty() {
            return false;
        }
        match self.kind {
            FeedKind::AppStore => true,
            FeedKind::GooglePlay => self
                .credentials
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty()),
        }
    }
}

/// A single review as handed to rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub author: String,
    pub body: String,
    /// Star rating, 1..=5.
    pub rating: u8,
    pub posted_at: Option<DateTime<Utc>>,
    pub app_version: Option<String>,
    pub build_number: Option<i64>,
    pub device: Option<String>,
    /// Android API level of the reviewer's device.
    pub os_level: Option<u32>,
}

/// A feed entry that could not be turned into an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed item {}: {reason}", id.as_deref().unwrap_or("<no id>"))]
pub struct MalformedItem {
    pub id: Option<String>,
    pub reason: String,
}

impl MalformedItem {
    pub fn new(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// One element of a feed page, in feed order.
pub type FeedEntry = Result<Item, MalformedItem>;

/// Identifier of a feed entry, readable even when the entry is malformed.
pub fn entry_id(entry: &FeedEntry) -> Option<&str> {
    match entry {
        Ok(item) => Some(item.id.as_str()),
        Err(bad) => bad.id.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: FeedKind) -> Target {
        Target {
            id: "t1".into(),
            kind,
            app_id: "com.example.app".into(),
            destination: Some(Destination(42)),
            display_name: None,
            locale: None,
            credentials: None,
            watermark: None,
            last_polled_at: None,
        }
    }

    #[test]
    fn name_falls_back_to_app_id() {
        let mut t = target(FeedKind::AppStore);
        assert_eq!(t.name(), "com.example.app");
        t.display_name = Some("  ".into());
        assert_eq!(t.name(), "com.example.app");
        t.display_name = Some("Example".into());
        assert_eq!(t.name(), "Example");
    }

    #[test]
    fn google_play_needs_credentials() {
        let mut t = target(FeedKind::GooglePlay);
        assert!(!t.is_eligible());
        t.credentials = Some("token".into());
        assert!(t.is_eligible());
        t.destination = None;
        assert!(!t.is_eligible());
    }

    #[test]
    fn watermark_serializes_tagged() {
        let w = Watermark::LastSeen("r5".into());
        let s = serde_json::to_string(&w).unwrap();
        assert_eq!(s, r#"{"type":"last_seen","value":"r5"}"#);
        let back: Watermark = serde_json::from_str(&s).unwrap();
        assert_eq!(back.last_seen(), Some("r5"));
        assert_eq!(back.cursor(), None);
    }
}

// tests/feed_contract.rs
//
// HTTP contracts of the App Store and Google Play feeds against a mock server.

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use review_relay::error::FeedError;
use review_relay::ingest::providers::app_store::AppStoreFeed;
use review_relay::ingest::providers::google_play::{GooglePlayFeed, TokenSource};
use review_relay::ingest::types::{FeedSource, OrdinalFeed, PagedFeed};
use review_relay::notify;
use review_relay::registry::store::TargetStore;
use review_relay::{FeedKind, Reconciler, Target, Watermark};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app_store_body() -> serde_json::Value {
    json!({"feed": {"entry": [
        {
            "id": {"label": "r2"},
            "author": {"name": {"label": "Ann"}},
            "im:version": {"label": "2.1"},
            "im:rating": {"label": "5"},
            "title": {"label": "Love it"},
            "content": {"label": "Works great"},
            "updated": {"label": "2024-05-01T10:00:00-07:00"}
        },
        {
            "id": {"label": "r1"},
            "author": {"name": {"label": "Bob"}},
            "im:version": {"label": "2.0"},
            "im:rating": {"label": "2"},
            "title": {"label": "Meh"},
            "content": {"label": "Slow"}
        }
    ]}})
}

fn play_review(id: &str, seconds: i64) -> serde_json::Value {
    json!({
        "reviewId": id,
        "authorName": "Cid",
        "comments": [{"userComment": {
            "text": format!("play {id}"),
            "lastModified": {"seconds": seconds.to_string(), "nanos": 0},
            "starRating": 4,
            "androidOsVersion": 34,
            "appVersionCode": 77,
            "appVersionName": "3.0"
        }}]
    })
}

#[tokio::test]
async fn app_store_requests_the_country_feed_and_parses_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/de/rss/customerreviews/id=123/sortBy=mostRecent/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_store_body()))
        .expect(1)
        .mount(&server)
        .await;

    let feed = AppStoreFeed::new(reqwest::Client::new()).with_base_url(server.uri());
    let mut t = target("ios", FeedKind::AppStore, 1);
    t.app_id = "123".into();
    t.locale = Some("DE".into());

    let entries = feed.fetch(&t).await.unwrap();
    assert_eq!(entries.len(), 2);
    let first = entries[0].as_ref().unwrap();
    assert_eq!(first.id, "r2");
    assert_eq!(first.body, "Love it\nWorks great");
    assert_eq!(first.app_version.as_deref(), Some("2.1"));
    assert_eq!(
        first.posted_at,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap())
    );
    assert_eq!(entries[1].as_ref().unwrap().rating, 2);
}

#[tokio::test]
async fn app_store_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let feed = AppStoreFeed::new(reqwest::Client::new()).with_base_url(server.uri());
    let err = feed
        .fetch(&target("ios", FeedKind::AppStore, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Status { status: 503, .. }), "{err}");
}

#[tokio::test]
async fn google_play_sends_bearer_language_and_continuation() {
    let server = MockServer::start().await;
    let api = "/androidpublisher/v3/applications/com.example.app/reviews";
    Mock::given(method("GET"))
        .and(path(api))
        .and(header("authorization", "Bearer secret"))
        .and(query_param("translationLanguage", "de"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [play_review("g3", 300)],
            "tokenPagination": {"nextPageToken": "next"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api))
        .and(query_param("token", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [play_review("g2", 200), play_review("g1", 100)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let feed = GooglePlayFeed::new(reqwest::Client::new()).with_base_url(server.uri());
    let mut t = target("droid", FeedKind::GooglePlay, 1);
    t.app_id = "com.example.app".into();
    t.locale = Some("de".into());
    t.credentials = Some("secret".into());

    let first = feed.fetch_page(&t, None).await.unwrap();
    assert_eq!(first.next_token.as_deref(), Some("next"));
    let item = first.entries[0].as_ref().unwrap();
    assert_eq!(item.body, "play g3");
    assert_eq!(item.build_number, Some(77));
    assert_eq!(item.os_level, Some(34));

    let second = feed.fetch_page(&t, Some("next")).await.unwrap();
    assert!(second.next_token.is_none());
    assert_eq!(second.entries.len(), 2);
}

#[tokio::test]
async fn google_play_poll_walks_pages_until_the_cursor() {
    let server = MockServer::start().await;
    let api = "/androidpublisher/v3/applications/app-droid/reviews";
    Mock::given(method("GET"))
        .and(path(api))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [play_review("g4", 400), play_review("g3", 300)],
            "tokenPagination": {"nextPageToken": "p2"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api))
        .and(query_param("token", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [play_review("g2", 200), play_review("g1", 100)],
            "tokenPagination": {"nextPageToken": "p3"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut t = target("droid", FeedKind::GooglePlay, 9);
    t.watermark = Some(Watermark::Cursor(at(150)));
    let store = store_with(vec![t]).await;
    let feed = GooglePlayFeed::new(reqwest::Client::new()).with_base_url(server.uri());
    let source = FeedSource::Paged {
        feed: Arc::new(feed),
        max_pages: 2,
    };
    let (outbox, mut rx) = notify::channel(16);
    let rec = Reconciler::new(source, store.clone(), outbox);

    let report = rec.poll("droid").await.unwrap();
    assert_eq!(report.emitted, 3);
    assert_eq!(report.pages, 2);
    let mut texts = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        texts.push(msg.text);
    }
    assert!(texts[0].ends_with("play g4"));
    assert!(texts[2].ends_with("play g2"));

    let stored = store.find("droid").await.unwrap().unwrap();
    assert_eq!(stored.watermark, Some(Watermark::Cursor(at(400))));
}

#[tokio::test]
async fn google_play_without_credentials_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let feed = GooglePlayFeed::new(reqwest::Client::new()).with_base_url(server.uri());
    let mut t = target("droid", FeedKind::GooglePlay, 1);
    t.credentials = None;
    assert!(matches!(
        feed.fetch_page(&t, None).await,
        Err(FeedError::Credentials(_))
    ));
}

/// Hands out a token minted elsewhere instead of the stored credentials.
struct Minted;

#[async_trait::async_trait]
impl TokenSource for Minted {
    async fn bearer_token(&self, target: &Target) -> Result<String, FeedError> {
        Ok(format!("minted-{}", target.id))
    }
}

#[tokio::test]
async fn google_play_uses_the_configured_token_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/androidpublisher/v3/applications/app-droid/reviews"))
        .and(header("authorization", "Bearer minted-droid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [play_review("g1", 100)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let feed = GooglePlayFeed::new(reqwest::Client::new())
        .with_base_url(server.uri())
        .with_token_source(Arc::new(Minted));
    let mut t = target("droid", FeedKind::GooglePlay, 1);
    t.credentials = None;

    let page = feed.fetch_page(&t, None).await.unwrap();
    assert_eq!(page.entries.len(), 1);
}

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use vibe_actors::{CategoryRuleset, KeywordCategorizer, PostStore};
use vibe_api::{AppState, SourceInfo, router};
use vibe_common::{NewPost, Platform};

fn categorizer() -> Arc<KeywordCategorizer> {
    let mut keywords = BTreeMap::new();
    keywords.insert("programming".to_string(), vec!["rust".to_string(), "python".to_string()]);
    keywords.insert("vscode".to_string(), vec!["vs code".to_string(), "vscode".to_string()]);
    Arc::new(KeywordCategorizer::new(CategoryRuleset::new("3", keywords)).unwrap())
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

fn post(
    platform: Platform,
    external_id: &str,
    source: &str,
    text: &str,
    created_at: DateTime<Utc>,
    categorizer: &KeywordCategorizer,
) -> NewPost {
    NewPost {
        platform,
        external_id: external_id.to_string(),
        platform_url: format!("https://example.test/{external_id}"),
        source_name: source.to_string(),
        author_username: Some("someone".to_string()),
        author_platform_id: None,
        content_text: text.to_string(),
        categories: categorizer.categorize(text),
        ruleset_version: Some(categorizer.tag().to_string()),
        additional_data: json!({}),
        created_at,
    }
}

async fn seeded_app() -> (axum::Router, PostStore) {
    let store = PostStore::connect("sqlite::memory:").await.unwrap();
    let cat = categorizer();
    let rows = [
        post(Platform::Reddit, "r1", "rust", "Rust 1.80 is out", at(1), &cat),
        post(Platform::Twitter, "t1", "editors", "VS Code with python rocks", at(3), &cat),
        post(Platform::Reddit, "r2", "rust", "weekend photos", at(2), &cat),
        post(Platform::Reddit, "r3", "python", "python packaging again", at(4), &cat),
    ];
    for row in rows {
        store.upsert(row).await.unwrap();
    }
    let state = AppState {
        store: store.clone(),
        categorizer: cat,
        sources: vec![SourceInfo {
            id: "rust-sub".to_string(),
            platform: "reddit".to_string(),
            source_name: "rust".to_string(),
            enabled: true,
            interval_secs: 900,
        }],
    };
    (router(Arc::new(state)), store)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn external_ids(body: &Value) -> Vec<&str> {
    body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["external_id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn health_is_plain_ok() {
    let (app, _) = seeded_app().await;
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn category_filter_returns_matching_posts_newest_first() {
    let (app, _) = seeded_app().await;
    let (status, body) = get(&app, "/api/v1/posts?category=programming").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(external_ids(&body), vec!["r3", "t1", "r1"]);
}

#[tokio::test]
async fn uncategorized_posts_only_show_up_unfiltered() {
    let (app, _) = seeded_app().await;
    let (_, all) = get(&app, "/api/v1/posts?order=asc").await;
    assert_eq!(all["total"], 4);
    assert_eq!(external_ids(&all), vec!["r1", "r2", "t1", "r3"]);

    for category in ["programming", "vscode"] {
        let (_, body) = get(&app, &format!("/api/v1/posts?category={category}")).await;
        assert!(!external_ids(&body).contains(&"r2"));
    }
}

#[tokio::test]
async fn combines_platform_source_and_time_filters() {
    let (app, _) = seeded_app().await;
    let (_, body) = get(&app, "/api/v1/posts?platform=twitter").await;
    assert_eq!(external_ids(&body), vec!["t1"]);

    let (_, body) = get(&app, "/api/v1/posts?platform=reddit,twitter&source_name=rust").await;
    assert_eq!(external_ids(&body), vec!["r2", "r1"]);

    let (_, body) = get(
        &app,
        "/api/v1/posts?since=2025-03-01T02:00:00Z&until=2025-03-01T04:00:00Z",
    )
    .await;
    assert_eq!(external_ids(&body), vec!["t1", "r2"]);
}

#[tokio::test]
async fn paginates_with_total_and_clamped_limit() {
    let (app, _) = seeded_app().await;
    let (_, body) = get(&app, "/api/v1/posts?limit=2&offset=1").await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["offset"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(external_ids(&body), vec!["t1", "r2"]);

    let (_, body) = get(&app, "/api/v1/posts?limit=0").await;
    assert_eq!(body["limit"], 1);
    let (_, body) = get(&app, "/api/v1/posts?limit=50000").await;
    assert_eq!(body["limit"], 1000);
}

#[tokio::test]
async fn rejects_bad_query_parameters() {
    let (app, _) = seeded_app().await;

    let (status, body) = get(&app, "/api/v1/posts?category=gardening").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["available"], json!(["programming", "vscode"]));

    for uri in [
        "/api/v1/posts?platform=myspace",
        "/api/v1/posts?sentiment=ecstatic",
        "/api/v1/posts?since=yesterday",
        "/api/v1/posts?order=sideways",
        "/api/v1/posts?since=2025-03-02&until=2025-03-01",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn post_detail_by_id() {
    let (app, store) = seeded_app().await;
    let filter = vibe_actors::PostFilter {
        platforms: vec![Platform::Twitter],
        ..Default::default()
    };
    let posts = store.query(&filter, &vibe_actors::Page::default()).await.unwrap();
    let id = posts[0].id;

    let (status, body) = get(&app, &format!("/api/v1/posts/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["external_id"], "t1");
    assert_eq!(body["categories"], json!(["programming", "vscode"]));

    let (status, _) = get(&app, &format!("/api/v1/posts/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/api/v1/posts/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn counts_categories_and_sources() {
    let (app, _) = seeded_app().await;

    let (status, counts) = get(&app, "/api/v1/posts/counts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["total"], 4);
    assert_eq!(counts["uncategorized"], 1);
    assert_eq!(counts["by_category"]["programming"], 3);
    assert_eq!(counts["by_platform"]["reddit"], 3);

    let (_, cats) = get(&app, "/api/v1/categories").await;
    assert_eq!(cats["version"], "3");
    assert_eq!(cats["categories"], json!(["programming", "vscode"]));
    assert!(cats["ruleset"].as_str().unwrap().starts_with("3+"));

    let (_, sources) = get(&app, "/api/v1/sources").await;
    assert_eq!(sources[0]["id"], "rust-sub");
    assert_eq!(sources[0]["interval_secs"], 900);
}

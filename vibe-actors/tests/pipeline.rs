use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use vibe_actors::actor::{spawn_actor, Addr};
use vibe_actors::analysis::{self, AnalysisActor};
use vibe_actors::ingest::{self, SourceIngestActor};
use vibe_actors::rate::{RateKey, RateLimiter};
use vibe_actors::store::{StoreActor, UpsertOutcome, MAX_ANALYSIS_ATTEMPTS};
use vibe_actors::{CategoryRuleset, KeywordCategorizer, PostFilter, PostStore};
use vibe_common::{Platform, RawPost, Result, Sentiment, VibeError};
use vibe_llm::{LlmClient, LlmResponse};
use vibe_social::PostSource;

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vibe_actors=debug")
        .with_test_writer()
        .try_init();
}

type Window = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

/// Serves `items` (newest first) the way the platform clients do: both
/// bounds inclusive, items without a timestamp always pass.
struct FakeSource {
    items: Vec<RawPost>,
    failing: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<Window>>>,
}

impl FakeSource {
    fn new(items: Vec<RawPost>) -> Self {
        Self {
            items,
            failing: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn created(raw: &RawPost) -> Option<DateTime<Utc>> {
    let secs = raw.payload.get("created_utc")?.as_f64()?;
    Utc.timestamp_opt(secs as i64, 0).single()
}

#[async_trait]
impl PostSource for FakeSource {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    fn source_name(&self) -> &str {
        "webdev"
    }

    async fn fetch_window(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RawPost>> {
        self.seen.lock().unwrap().push((since, until));
        if self.failing.load(Ordering::SeqCst) {
            return Err(VibeError::unavailable("reddit", "503 Service Unavailable"));
        }
        Ok(self
            .items
            .iter()
            .filter(|raw| match created(raw) {
                Some(at) => since.map_or(true, |s| at >= s) && until.map_or(true, |u| at <= u),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

fn submission(id: &str, title: &str, created_utc: f64) -> RawPost {
    RawPost {
        platform: Platform::Reddit,
        source_name: "webdev".into(),
        payload: json!({
            "id": id,
            "title": title,
            "selftext": "",
            "created_utc": created_utc,
            "permalink": format!("/r/webdev/comments/{id}/x/"),
            "author": "dev"
        }),
    }
}

fn categorizer() -> Arc<KeywordCategorizer> {
    let mut keywords = BTreeMap::new();
    keywords.insert("vscode".to_string(), vec!["vs code".to_string(), "vscode".to_string()]);
    keywords.insert("cursor".to_string(), vec!["cursor".to_string()]);
    keywords.insert("webdev".to_string(), vec!["webdev".to_string(), "web dev".to_string()]);
    Arc::new(KeywordCategorizer::new(CategoryRuleset::new("1", keywords)).unwrap())
}

async fn store() -> (PostStore, Addr<StoreActor>) {
    let store = PostStore::connect("sqlite::memory:").await.unwrap();
    let addr = spawn_actor(StoreActor::new(store.clone()), 64).addr;
    (store, addr)
}

#[tokio::test]
async fn ingest_cycle_normalizes_categorizes_and_dedups() {
    init_test_tracing();
    let (store, store_addr) = store().await;
    let mut broken = submission("bad", "no timestamp", 0.0);
    broken.payload.as_object_mut().unwrap().remove("created_utc");

    let source = FakeSource::new(vec![
        submission("b", "Check out this new VS Code extension for webdev", 1_717_243_300.0),
        broken,
        submission("a", "Is Cursor worth it?", 1_717_243_200.0),
    ]);
    let seen = source.seen.clone();
    let limiter = spawn_actor(RateLimiter::new().with_default(100.0, 10), 8).addr;
    let actor = SourceIngestActor::new("reddit-webdev", Box::new(source), categorizer(), store_addr)
        .with_rate_limit(limiter, RateKey::source("reddit-webdev"));
    let addr = spawn_actor(actor, 4).addr;

    let first = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.cursor, Some(Utc.timestamp_opt(1_717_243_300, 0).unwrap()));

    let webdev = PostFilter {
        category: Some("webdev".into()),
        ..Default::default()
    };
    let posts = store.query(&webdev, &Default::default()).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].categories, vec!["vscode", "webdev"]);
    assert_eq!(posts[0].source_name, "webdev");
    assert!(posts[0].ruleset_version.as_deref().unwrap().starts_with("1+"));

    // The cursor is inclusive: the item on it comes back as a duplicate.
    let second = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.cursor, first.cursor);
    assert_eq!(store.count(&PostFilter::default()).await.unwrap(), 2);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(None, None), (first.cursor, None)]);
}

#[tokio::test]
async fn failed_fetch_keeps_cursor_and_actor_alive() {
    init_test_tracing();
    let (_store, store_addr) = store().await;
    let source = FakeSource::new(vec![submission("a", "cursor tips", 1_717_243_200.0)]);
    let failing = source.failing.clone();
    let seen = source.seen.clone();
    failing.store(true, Ordering::SeqCst);
    let cursor = Utc.timestamp_opt(1_717_000_000, 0).unwrap();
    let actor = SourceIngestActor::new("reddit-webdev", Box::new(source), categorizer(), store_addr)
        .with_cursor(Some(cursor));
    let addr = spawn_actor(actor, 4).addr;

    let err = ingest::run_cycle(&addr).await.unwrap_err();
    let err = err.downcast::<VibeError>().unwrap();
    assert!(matches!(err, VibeError::ExternalServiceUnavailable { ref service, .. } if service == "reddit"));

    failing.store(false, Ordering::SeqCst);
    let report = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!(report.inserted, 1);

    // Both attempts asked from the seeded cursor.
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(Some(cursor), None), (Some(cursor), None)]);
}

#[tokio::test]
async fn backlog_larger_than_one_fetch_is_paged_back_before_the_cursor_moves() {
    init_test_tracing();
    let (store, store_addr) = store().await;
    let source = FakeSource::new(vec![
        submission("c", "third", 300.0),
        submission("b", "second", 200.0),
        submission("a", "first", 100.0),
    ]);
    let seen = source.seen.clone();
    let actor = SourceIngestActor::new("reddit-webdev", Box::new(source), categorizer(), store_addr)
        .with_max_per_fetch(2);
    let addr = spawn_actor(actor, 4).addr;

    let report = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.fetches, 3);
    assert_eq!(report.backlog_until, None);
    assert_eq!(report.cursor, Some(Utc.timestamp_opt(300, 0).unwrap()));
    assert_eq!(store.count(&PostFilter::default()).await.unwrap(), 3);

    let at = |secs| Some(Utc.timestamp_opt(secs, 0).unwrap());
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(None, None), (None, at(200)), (None, at(100))]);
}

#[tokio::test]
async fn unfinished_backlog_resumes_on_the_next_cycle() {
    init_test_tracing();
    let (store, store_addr) = store().await;
    let items = (1..=20)
        .rev()
        .map(|n| submission(&format!("p{n}"), "webdev news", f64::from(n) * 100.0))
        .collect();
    let actor = SourceIngestActor::new("reddit-webdev", Box::new(FakeSource::new(items)), categorizer(), store_addr)
        .with_max_per_fetch(2);
    let addr = spawn_actor(actor, 4).addr;

    // Each full page after the first overlaps the previous one by an item,
    // so eight fetches store nine posts and leave the rest for later.
    let first = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!(first.fetches, 8);
    assert_eq!(first.inserted, 9);
    assert_eq!(first.cursor, None);
    assert_eq!(first.backlog_until, Some(Utc.timestamp_opt(1300, 0).unwrap()));

    let mut cycles = 1;
    let mut last = first;
    while last.backlog_until.is_some() {
        assert!(cycles < 5, "backlog never drained");
        last = ingest::run_cycle(&addr).await.unwrap();
        cycles += 1;
    }
    assert_eq!(last.cursor, Some(Utc.timestamp_opt(2000, 0).unwrap()));
    assert_eq!(store.count(&PostFilter::default()).await.unwrap(), 20);

    // Once drained, only the item on the cursor is seen again.
    let steady = ingest::run_cycle(&addr).await.unwrap();
    assert_eq!((steady.fetches, steady.inserted, steady.duplicates), (1, 0, 1));
}

#[tokio::test]
async fn one_failing_source_does_not_stop_the_others() {
    init_test_tracing();
    let (store, store_addr) = store().await;
    let broken = FakeSource::new(vec![submission("x", "never stored", 500.0)]);
    broken.failing.store(true, Ordering::SeqCst);
    let healthy = FakeSource::new(vec![submission("a", "cursor tips", 400.0)]);

    let broken = spawn_actor(
        SourceIngestActor::new("reddit-broken", Box::new(broken), categorizer(), store_addr.clone()),
        4,
    )
    .addr;
    let healthy = spawn_actor(
        SourceIngestActor::new("reddit-webdev", Box::new(healthy), categorizer(), store_addr),
        4,
    )
    .addr;

    // The failing source comes first and must not short-circuit the second.
    let summary = ingest::run_cycles([("reddit-broken", &broken), ("reddit-webdev", &healthy)]).await;
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].source_id, "reddit-webdev");
    assert_eq!(summary.reports[0].inserted, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].source_id, "reddit-broken");
    assert!(summary.failures[0].error.contains("503"));
    assert_eq!(store.count(&PostFilter::default()).await.unwrap(), 1);

    let summary = summary.into_result().unwrap();
    assert_eq!(summary.failures.len(), 1);

    // Only an all-failed run is an error.
    let all_failed = ingest::run_cycles([("reddit-broken", &broken)]).await;
    let err = all_failed.into_result().unwrap_err();
    assert!(err.to_string().contains("reddit-broken"));
}

#[tokio::test]
async fn concurrent_upserts_of_one_post_store_it_once() {
    init_test_tracing();
    let (store, _store_addr) = store().await;
    let post = vibe_social::normalize(&submission("dup", "cursor vs vscode", 1_717_243_200.0)).unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let store = store.clone();
        let post = post.clone();
        tasks.spawn(async move { store.upsert(post).await });
    }
    let mut inserted = Vec::new();
    let mut duplicates = Vec::new();
    while let Some(res) = tasks.join_next().await {
        match res.unwrap().unwrap() {
            UpsertOutcome::Inserted(post) => inserted.push(post.id),
            UpsertOutcome::Duplicate { id } => duplicates.push(id),
        }
    }
    assert_eq!(inserted.len(), 1);
    assert_eq!(duplicates.len(), 7);
    assert!(duplicates.iter().all(|id| *id == inserted[0]));
    assert_eq!(store.count(&PostFilter::default()).await.unwrap(), 1);
}

/// Answers from canned JSON keyed by words in the post.
struct ScriptedLlm;

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let text = if prompt.contains("explode") {
            return Err(VibeError::unavailable("llm", "500 Internal Server Error"));
        } else if prompt.contains("Cursor") {
            json!({
                "sentiment": "positive",
                "confidence": 0.92,
                "products": [{ "name": "Cursor", "sentiment": "positive" }],
                "categories": ["cursor", "ai-hype"],
                "explanation": "enthusiastic"
            })
        } else {
            json!({ "sentiment": "negative", "confidence": 0.4, "categories": ["webdev"] })
        };
        Ok(LlmResponse {
            text: format!("Here you go:\n```json\n{text}\n```"),
            model: Some("scripted-1".into()),
            tokens_used: None,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }
}

#[tokio::test]
async fn analysis_batch_merges_known_categories_and_counts_failures() {
    init_test_tracing();
    let (store, store_addr) = store().await;
    let cats = categorizer();
    let source = FakeSource::new(vec![
        submission("c", "Cursor is amazing", 1_717_243_300.0),
        submission("d", "meh, nothing special", 1_717_243_200.0),
        submission("e", "this will explode", 1_717_243_100.0),
    ]);
    let ingest_addr =
        spawn_actor(SourceIngestActor::new("src", Box::new(source), cats.clone(), store_addr.clone()), 4).addr;
    ingest::run_cycle(&ingest_addr).await.unwrap();

    let actor = AnalysisActor::new(Arc::new(ScriptedLlm), cats, store_addr)
        .with_batch_size(10)
        .with_min_confidence(0.7);
    let addr = spawn_actor(actor, 4).addr;

    let report = analysis::run_batch(&addr).await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.analyzed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.low_confidence, 1);

    let all = store.query(&PostFilter::default(), &Default::default()).await.unwrap();
    let by_id = |ext: &str| all.iter().find(|p| p.external_id == ext).unwrap().clone();

    let c = by_id("c");
    assert_eq!(c.sentiment, Some(Sentiment::Positive));
    // "ai-hype" is not a configured category and is dropped.
    assert_eq!(c.categories, vec!["cursor"]);
    assert_eq!(c.analysis.as_ref().unwrap().products[0].name, "Cursor");

    let d = by_id("d");
    assert_eq!(d.sentiment, Some(Sentiment::Neutral));
    assert_eq!(d.analysis.as_ref().unwrap().sentiment, Sentiment::Negative);
    assert_eq!(d.categories, vec!["webdev"]);

    let e = by_id("e");
    assert!(e.analyzed_at.is_none());
    assert!(e.categories.is_empty());

    // Only the failed post is offered again, until it runs out of attempts.
    for _ in 1..MAX_ANALYSIS_ATTEMPTS {
        let report = analysis::run_batch(&addr).await.unwrap();
        assert_eq!((report.attempted, report.failed), (1, 1));
    }
    let report = analysis::run_batch(&addr).await.unwrap();
    assert_eq!(report.attempted, 0);
}

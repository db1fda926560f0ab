//! SQLite-backed post storage.
//!
//! [`PostStore`] is a cheap-to-clone handle over the pool. Reads go straight
//! to the pool; writes take a single-permit semaphore, so SQLite never sees
//! interleaved writers and the last write wins. [`StoreActor`] exposes the
//! write side to the ingestion and analysis actors through its mailbox.
//!
//! Timestamps are stored as RFC 3339 UTC text with microsecond precision and
//! `categories` as a JSON array queried with `json_each`.
use crate::actor::{Actor, Addr, Context};
use crate::categorize::KeywordCategorizer;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vibe_common::{NewPost, Platform, Post, PostAnalysis, Result, Sentiment, VibeError};

/// Posts whose analysis failed this many times are no longer offered to the LLM.
pub const MAX_ANALYSIS_ATTEMPTS: i64 = 3;
const RECATEGORIZE_CHUNK: i64 = 500;

const POST_COLUMNS: &str = "id, platform, external_id, platform_url, source_name, \
    author_username, author_platform_id, content_text, categories, ruleset_version, \
    sentiment, analysis, analyzed_at, additional_data, created_at, ingested_at, updated_at";

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| VibeError::storage(format!("bad {column} timestamp {raw:?}: {e}")))
}

fn db_err(err: sqlx::Error) -> VibeError {
    VibeError::storage(err)
}

fn json_err(column: &str) -> impl FnOnce(serde_json::Error) -> VibeError + '_ {
    move |e| VibeError::storage(format!("bad {column} json: {e}"))
}

fn normalized(mut categories: Vec<String>) -> Vec<String> {
    categories.sort();
    categories.dedup();
    categories
}

#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Inserted(Box<Post>),
    /// A row with the same `(platform, external_id)` already existed; nothing changed.
    Duplicate { id: Uuid },
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(post) => post.id,
            UpsertOutcome::Duplicate { id } => *id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desc" | "newest" => Ok(SortOrder::Desc),
            "asc" | "oldest" => Ok(SortOrder::Asc),
            other => Err(format!("unknown order: {other}")),
        }
    }
}

/// Conjunction of optional predicates. Empty `platforms` means any platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostFilter {
    #[serde(default)]
    pub platforms: Vec<Platform>,
    pub category: Option<String>,
    pub source_name: Option<String>,
    pub sentiment: Option<Sentiment>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
}

impl PostFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if !self.platforms.is_empty() {
            qb.push(" AND platform IN (");
            let mut list = qb.separated(", ");
            for p in &self.platforms {
                list.push_bind(p.as_str());
            }
            list.push_unseparated(")");
        }
        if let Some(category) = &self.category {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(posts.categories) WHERE json_each.value = ")
                .push_bind(category.clone())
                .push(")");
        }
        if let Some(source) = &self.source_name {
            qb.push(" AND source_name = ").push_bind(source.clone());
        }
        if let Some(sentiment) = self.sentiment {
            qb.push(" AND sentiment = ").push_bind(sentiment.as_str());
        }
        if let Some(since) = &self.since {
            qb.push(" AND created_at >= ").push_bind(ts(since));
        }
        if let Some(until) = &self.until {
            qb.push(" AND created_at < ").push_bind(ts(until));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
    pub order: SortOrder,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCounts {
    pub total: u64,
    pub uncategorized: u64,
    pub analyzed: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_platform: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub by_sentiment: BTreeMap<String, u64>,
}

/// What the analysis job writes back for one post.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    /// Effective sentiment; may differ from `analysis.sentiment` when confidence was low.
    pub sentiment: Sentiment,
    pub analysis: PostAnalysis,
    /// LLM-suggested categories already restricted to the configured set.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecategorizeReport {
    pub ruleset_version: String,
    pub scanned: u64,
    pub changed: u64,
}

impl fmt::Display for RecategorizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ruleset {}: {} posts rescanned, {} changed",
            self.ruleset_version, self.scanned, self.changed
        )
    }
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let text = |c: &str| row.try_get::<String, _>(c).map_err(db_err);
    let opt_text = |c: &str| row.try_get::<Option<String>, _>(c).map_err(db_err);

    let id_raw = text("id")?;
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| VibeError::storage(format!("bad post id {id_raw:?}: {e}")))?;
    let platform: Platform = text("platform")?.parse().map_err(VibeError::storage)?;
    let categories: Vec<String> =
        serde_json::from_str(&text("categories")?).map_err(json_err("categories"))?;
    let sentiment = opt_text("sentiment")?
        .map(|s| s.parse::<Sentiment>())
        .transpose()
        .map_err(VibeError::storage)?;
    let analysis = opt_text("analysis")?
        .map(|s| serde_json::from_str::<PostAnalysis>(&s))
        .transpose()
        .map_err(json_err("analysis"))?;
    let analyzed_at = opt_text("analyzed_at")?
        .map(|s| parse_ts("analyzed_at", &s))
        .transpose()?;

    Ok(Post {
        id,
        platform,
        external_id: text("external_id")?,
        platform_url: text("platform_url")?,
        source_name: text("source_name")?,
        author_username: opt_text("author_username")?,
        author_platform_id: opt_text("author_platform_id")?,
        content_text: text("content_text")?,
        categories,
        ruleset_version: opt_text("ruleset_version")?,
        sentiment,
        analysis,
        analyzed_at,
        additional_data: serde_json::from_str(&text("additional_data")?)
            .map_err(json_err("additional_data"))?,
        created_at: parse_ts("created_at", &text("created_at")?)?,
        ingested_at: parse_ts("ingested_at", &text("ingested_at")?)?,
        updated_at: parse_ts("updated_at", &text("updated_at")?)?,
    })
}

#[derive(Clone, Debug)]
pub struct PostStore {
    pool: SqlitePool,
    write_limit: Arc<Semaphore>,
}

impl PostStore {
    /// Wrap an existing pool. The schema must already be migrated; see [`PostStore::migrate`].
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_limit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Open (creating if needed) the database at `database_url` and apply migrations.
    ///
    /// In-memory URLs get a single, never-recycled connection so every caller
    /// sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let mut opts = SqliteConnectOptions::from_str(database_url)
            .map_err(db_err)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_opts.connect_with(opts).await.map_err(db_err)?;
        let store = Self::new(pool);
        store.migrate().await?;
        info!(in_memory, "store.connected");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(VibeError::storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn write_permit(&self) -> Result<SemaphorePermit<'_>> {
        self.write_limit.acquire().await.map_err(VibeError::storage)
    }

    /// Insert a normalized post unless `(platform, external_id)` is already stored.
    pub async fn upsert(&self, post: NewPost) -> Result<UpsertOutcome> {
        let _permit = self.write_permit().await?;

        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(6);
        let created_at = post.created_at.trunc_subsecs(6);
        let categories = normalized(post.categories);
        let categories_json = serde_json::to_string(&categories).map_err(json_err("categories"))?;
        let additional_json =
            serde_json::to_string(&post.additional_data).map_err(json_err("additional_data"))?;

        let res = sqlx::query(
            r#"INSERT INTO posts
               (id, platform, external_id, platform_url, source_name, author_username,
                author_platform_id, content_text, categories, ruleset_version,
                additional_data, created_at, ingested_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
               ON CONFLICT(platform, external_id) DO NOTHING"#,
        )
        .bind(id.to_string())
        .bind(post.platform.as_str())
        .bind(&post.external_id)
        .bind(&post.platform_url)
        .bind(&post.source_name)
        .bind(&post.author_username)
        .bind(&post.author_platform_id)
        .bind(&post.content_text)
        .bind(&categories_json)
        .bind(&post.ruleset_version)
        .bind(&additional_json)
        .bind(ts(&created_at))
        .bind(ts(&now))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            let existing: String =
                sqlx::query_scalar("SELECT id FROM posts WHERE platform = ?1 AND external_id = ?2")
                    .bind(post.platform.as_str())
                    .bind(&post.external_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_err)?;
            let id = Uuid::parse_str(&existing).map_err(VibeError::storage)?;
            debug!(platform=%post.platform, external_id=%post.external_id, %id, "store.upsert.duplicate");
            return Ok(UpsertOutcome::Duplicate { id });
        }

        info!(
            platform=%post.platform,
            external_id=%post.external_id,
            source=%post.source_name,
            categories=?categories,
            %id,
            "store.upsert.inserted"
        );
        Ok(UpsertOutcome::Inserted(Box::new(Post {
            id,
            platform: post.platform,
            external_id: post.external_id,
            platform_url: post.platform_url,
            source_name: post.source_name,
            author_username: post.author_username,
            author_platform_id: post.author_platform_id,
            content_text: post.content_text,
            categories,
            ruleset_version: post.ruleset_version,
            sentiment: None,
            analysis: None,
            analyzed_at: None,
            additional_data: post.additional_data,
            created_at,
            ingested_at: now,
            updated_at: now,
        })))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_post).transpose()
    }

    pub async fn query(&self, filter: &PostFilter, page: &Page) -> Result<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        filter.push_where(&mut qb);
        qb.push(match page.order {
            SortOrder::Desc => " ORDER BY created_at DESC, rowid DESC",
            SortOrder::Asc => " ORDER BY created_at ASC, rowid ASC",
        });
        qb.push(" LIMIT ")
            .push_bind(page.limit.min(i64::MAX as u64) as i64)
            .push(" OFFSET ")
            .push_bind(page.offset.min(i64::MAX as u64) as i64);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        debug!(filter=?filter, page=?page, rows = rows.len(), "store.query");
        rows.iter().map(row_to_post).collect()
    }

    pub async fn count(&self, filter: &PostFilter) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        filter.push_where(&mut qb);
        let n: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(n.max(0) as u64)
    }

    /// Newest `created_at` stored for one source; seeds an ingestion cursor after restart.
    pub async fn latest_created_at(
        &self,
        platform: Platform,
        source_name: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM posts WHERE platform = ?1 AND source_name = ?2",
        )
        .bind(platform.as_str())
        .bind(source_name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        raw.map(|s| parse_ts("created_at", &s)).transpose()
    }

    async fn grouped(&self, sql: &str) -> Result<BTreeMap<String, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|(k, n)| (k, n.max(0) as u64)).collect())
    }

    pub async fn counts(&self) -> Result<PostCounts> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS total,
                      COALESCE(SUM(json_array_length(categories) = 0), 0) AS uncategorized,
                      COUNT(analyzed_at) AS analyzed
               FROM posts"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let n = |c: &str| row.try_get::<i64, _>(c).map(|v| v.max(0) as u64).map_err(db_err);

        Ok(PostCounts {
            total: n("total")?,
            uncategorized: n("uncategorized")?,
            analyzed: n("analyzed")?,
            by_category: self
                .grouped(
                    "SELECT j.value, COUNT(*) FROM posts, json_each(posts.categories) AS j GROUP BY j.value",
                )
                .await?,
            by_platform: self
                .grouped("SELECT platform, COUNT(*) FROM posts GROUP BY platform")
                .await?,
            by_source: self
                .grouped("SELECT source_name, COUNT(*) FROM posts GROUP BY source_name")
                .await?,
            by_sentiment: self
                .grouped(
                    "SELECT sentiment, COUNT(*) FROM posts WHERE sentiment IS NOT NULL GROUP BY sentiment",
                )
                .await?,
        })
    }

    /// Oldest posts without an analysis that have not exhausted their attempts.
    pub async fn pending_analysis(&self, limit: u32) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE analyzed_at IS NULL AND analysis_attempts < ?1 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?2"
        ))
        .bind(MAX_ANALYSIS_ATTEMPTS)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_post).collect()
    }

    /// Store the analysis and merge its categories into the post. Returns the merged categories.
    pub async fn record_analysis(&self, id: Uuid, record: &AnalysisRecord) -> Result<Vec<String>> {
        let _permit = self.write_permit().await?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<String> = sqlx::query_scalar("SELECT categories FROM posts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(current) = current else {
            return Err(VibeError::PostNotFound(id));
        };

        let mut categories: Vec<String> =
            serde_json::from_str(&current).map_err(json_err("categories"))?;
        categories.extend(record.categories.iter().cloned());
        let categories = normalized(categories);
        let llm_categories = normalized(record.categories.clone());
        let now = ts(&Utc::now());

        sqlx::query(
            r#"UPDATE posts
               SET categories = ?1, llm_categories = ?2, sentiment = ?3, analysis = ?4,
                   analyzed_at = ?5, updated_at = ?5
               WHERE id = ?6"#,
        )
        .bind(serde_json::to_string(&categories).map_err(json_err("categories"))?)
        .bind(serde_json::to_string(&llm_categories).map_err(json_err("llm_categories"))?)
        .bind(record.sentiment.as_str())
        .bind(serde_json::to_string(&record.analysis).map_err(json_err("analysis"))?)
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        info!(%id, sentiment=%record.sentiment, categories=?categories, "store.record_analysis");
        Ok(categories)
    }

    /// Count a failed analysis attempt. Returns the attempts recorded so far.
    pub async fn record_analysis_failure(&self, id: Uuid) -> Result<i64> {
        let _permit = self.write_permit().await?;
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"UPDATE posts SET analysis_attempts = analysis_attempts + 1, updated_at = ?1
               WHERE id = ?2
               RETURNING analysis_attempts"#,
        )
        .bind(ts(&Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let attempts = attempts.ok_or(VibeError::PostNotFound(id))?;
        if attempts >= MAX_ANALYSIS_ATTEMPTS {
            warn!(%id, attempts, "store.analysis.gave_up");
        }
        Ok(attempts)
    }

    /// Re-apply `categorizer` to every post tagged by a different ruleset.
    ///
    /// LLM-suggested categories are kept only while they remain configured.
    pub async fn recategorize(&self, categorizer: &KeywordCategorizer) -> Result<RecategorizeReport> {
        let tag = categorizer.tag().to_string();
        let mut report = RecategorizeReport {
            ruleset_version: tag.clone(),
            ..Default::default()
        };

        loop {
            let _permit = self.write_permit().await?;
            let rows: Vec<(String, String, String, String)> = sqlx::query_as(
                r#"SELECT id, content_text, categories, llm_categories FROM posts
                   WHERE ruleset_version IS NULL OR ruleset_version != ?1
                   ORDER BY rowid LIMIT ?2"#,
            )
            .bind(&tag)
            .bind(RECATEGORIZE_CHUNK)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            if rows.is_empty() {
                break;
            }

            let now = ts(&Utc::now());
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            for (id, text, old, llm) in rows {
                let old: Vec<String> = serde_json::from_str(&old).map_err(json_err("categories"))?;
                let llm: Vec<String> = serde_json::from_str(&llm).map_err(json_err("llm_categories"))?;

                let mut categories = categorizer.categorize(&text);
                categories.extend(categorizer.retain_known(&llm));
                let categories = normalized(categories);
                if categories != old {
                    report.changed += 1;
                }
                report.scanned += 1;

                sqlx::query(
                    "UPDATE posts SET categories = ?1, ruleset_version = ?2, updated_at = ?3 WHERE id = ?4",
                )
                .bind(serde_json::to_string(&categories).map_err(json_err("categories"))?)
                .bind(&tag)
                .bind(&now)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            tx.commit().await.map_err(db_err)?;
        }

        info!(ruleset=%tag, scanned = report.scanned, changed = report.changed, "store.recategorize");
        Ok(report)
    }
}

pub enum StoreMsg {
    Upsert {
        post: NewPost,
        reply: oneshot::Sender<Result<UpsertOutcome>>,
    },
    PendingAnalysis {
        limit: u32,
        reply: oneshot::Sender<Result<Vec<Post>>>,
    },
    RecordAnalysis {
        id: Uuid,
        record: AnalysisRecord,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    AnalysisFailed {
        id: Uuid,
        reply: oneshot::Sender<Result<i64>>,
    },
    Recategorize {
        categorizer: Arc<KeywordCategorizer>,
        reply: oneshot::Sender<Result<RecategorizeReport>>,
    },
    Counts {
        reply: oneshot::Sender<Result<PostCounts>>,
    },
}

/// Mailbox front for [`PostStore`]. Each request runs on its own task; the
/// store's write semaphore keeps writes serialized.
pub struct StoreActor {
    store: PostStore,
}

impl StoreActor {
    pub fn new(store: PostStore) -> Self {
        Self { store }
    }
}

fn reply<T: Send + 'static>(
    tx: oneshot::Sender<Result<T>>,
    what: &'static str,
    fut: impl std::future::Future<Output = Result<T>> + Send + 'static,
) {
    tokio::spawn(async move {
        let res = fut.await;
        if let Err(e) = &res {
            warn!(error=%e, op = what, "store.request.failed");
        }
        if tx.send(res).is_err() {
            debug!(op = what, "store.reply_dropped");
        }
    });
}

#[async_trait::async_trait]
impl Actor for StoreActor {
    type Msg = StoreMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> anyhow::Result<()> {
        let store = self.store.clone();
        match msg {
            StoreMsg::Upsert { post, reply: tx } => {
                reply(tx, "upsert", async move { store.upsert(post).await });
            }
            StoreMsg::PendingAnalysis { limit, reply: tx } => {
                reply(tx, "pending_analysis", async move {
                    store.pending_analysis(limit).await
                });
            }
            StoreMsg::RecordAnalysis {
                id,
                record,
                reply: tx,
            } => {
                reply(tx, "record_analysis", async move {
                    store.record_analysis(id, &record).await
                });
            }
            StoreMsg::AnalysisFailed { id, reply: tx } => {
                reply(tx, "analysis_failed", async move {
                    store.record_analysis_failure(id).await
                });
            }
            StoreMsg::Recategorize {
                categorizer,
                reply: tx,
            } => {
                reply(tx, "recategorize", async move {
                    store.recategorize(&categorizer).await
                });
            }
            StoreMsg::Counts { reply: tx } => {
                reply(tx, "counts", async move { store.counts().await });
            }
        }
        Ok(())
    }
}

/// Send a request built by `make` and wait for the store's answer.
pub async fn ask<T>(
    store: &Addr<StoreActor>,
    make: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreMsg,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    store
        .send(make(tx))
        .await
        .map_err(|_| VibeError::storage("store actor stopped"))?;
    rx.await
        .map_err(|_| VibeError::storage("store actor dropped the request"))?
}

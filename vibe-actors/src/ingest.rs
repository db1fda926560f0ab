//! Per-source ingestion actor.
//!
//! Every configured source gets its own actor with its own cursor, client and
//! rate bucket; the only shared collaborator is the [`StoreActor`]. A cycle
//! fetches items newer than the cursor, normalizes and categorizes them and
//! upserts them one by one.
//!
//! Sources answer newest first, so a cycle walks backwards: after a full page
//! it asks again with `until` set to the oldest item seen, until a short page
//! shows the gap down to the cursor is closed. Only then does the cursor move
//! to the newest item. A cycle that runs out of fetches first, or fails, keeps
//! the unfinished window as a backlog and resumes it next time.
use crate::actor::{Actor, Addr, Context};
use crate::categorize::KeywordCategorizer;
use crate::rate::{self, RateKey, RateLimiter};
use crate::store::{self, StoreActor, StoreMsg, UpsertOutcome};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vibe_common::{Result, VibeError};
use vibe_social::{normalize, PostSource};

pub enum IngestCmd {
    RunCycle {
        reply: oneshot::Sender<Result<CycleReport>>,
    },
}

/// Fetches a single cycle may spend on one source before yielding.
const MAX_FETCHES_PER_CYCLE: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub source_id: String,
    pub fetches: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub cursor: Option<DateTime<Utc>>,
    /// Older items between the cursor and `backlog_until` are still to be fetched.
    pub backlog_until: Option<DateTime<Utc>>,
}

/// Window `[cursor, until]` not yet drained; everything in `(until, newest]` is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Backlog {
    newest: DateTime<Utc>,
    until: DateTime<Utc>,
}

pub struct SourceIngestActor {
    id: String,
    source: Box<dyn PostSource>,
    categorizer: Arc<KeywordCategorizer>,
    store: Addr<StoreActor>,
    rate: Option<(Addr<RateLimiter>, RateKey)>,
    cursor: Option<DateTime<Utc>>,
    backlog: Option<Backlog>,
    max_per_fetch: usize,
}

impl SourceIngestActor {
    pub fn new(
        id: impl Into<String>,
        source: Box<dyn PostSource>,
        categorizer: Arc<KeywordCategorizer>,
        store: Addr<StoreActor>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            categorizer,
            store,
            rate: None,
            cursor: None,
            backlog: None,
            max_per_fetch: 25,
        }
    }

    pub fn with_rate_limit(mut self, limiter: Addr<RateLimiter>, key: RateKey) -> Self {
        self.rate = Some((limiter, key));
        self
    }

    pub fn with_cursor(mut self, cursor: Option<DateTime<Utc>>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_max_per_fetch(mut self, n: usize) -> Self {
        self.max_per_fetch = n.max(1);
        self
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport {
            source_id: self.id.clone(),
            ..Default::default()
        };
        let mut newest = self.backlog.map(|b| b.newest);
        let mut until = self.backlog.map(|b| b.until);
        let mut drained = false;

        for _ in 0..MAX_FETCHES_PER_CYCLE {
            let page = self.fetch_page(until, &mut report).await;
            let (len, oldest, page_newest) = match page {
                Ok(page) => page,
                Err(e) => {
                    // Pages already stored stay covered by the backlog.
                    self.backlog = newest.zip(until).map(|(newest, until)| Backlog { newest, until });
                    return Err(e);
                }
            };
            newest = newest.max(page_newest);
            if len < self.max_per_fetch {
                drained = true;
                break;
            }
            match (oldest, until) {
                (Some(oldest), None) => until = Some(oldest),
                (Some(oldest), Some(u)) if oldest < u => until = Some(oldest),
                (Some(_), Some(u)) => {
                    // A whole page on one timestamp; the rest of that second is lost.
                    warn!(source=%self.id, until=%u, "ingest.window.crowded");
                    until = Some(u - chrono::Duration::seconds(1));
                }
                (None, _) => {
                    warn!(source=%self.id, until=?until, "ingest.window.stalled");
                    drained = true;
                    break;
                }
            }
        }

        if drained {
            self.cursor = self.cursor.max(newest);
            self.backlog = None;
        } else {
            self.backlog = newest.zip(until).map(|(newest, until)| Backlog { newest, until });
        }
        report.cursor = self.cursor;
        report.backlog_until = self.backlog.map(|b| b.until);
        Ok(report)
    }

    /// One fetch of `[cursor, until]`, stored item by item. Returns the page
    /// length and the oldest and newest `created_at` among stored items.
    async fn fetch_page(
        &self,
        until: Option<DateTime<Utc>>,
        report: &mut CycleReport,
    ) -> Result<(usize, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        if let Some((limiter, key)) = &self.rate {
            rate::acquire(limiter, key, 1)
                .await
                .map_err(|e| VibeError::unavailable("rate-limiter", e))?;
        }

        let raw_items = self
            .source
            .fetch_window(self.cursor, until, self.max_per_fetch)
            .await?;
        report.fetches += 1;
        report.fetched += raw_items.len();
        let len = raw_items.len();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for raw in raw_items {
            let mut post = match normalize(&raw) {
                Ok(post) => post,
                Err(e) if e.is_skippable() => {
                    warn!(
                        source=%self.id,
                        external_id=?raw.external_id_hint(),
                        error=%e,
                        "ingest.normalize.skipped"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            post.categories = self.categorizer.categorize(&post.content_text);
            post.ruleset_version = Some(self.categorizer.tag().to_string());
            let created_at = post.created_at;

            match store::ask(&self.store, |reply| StoreMsg::Upsert { post, reply }).await? {
                UpsertOutcome::Inserted(_) => report.inserted += 1,
                UpsertOutcome::Duplicate { .. } => report.duplicates += 1,
            }
            newest = newest.max(Some(created_at));
            oldest = Some(oldest.map_or(created_at, |o| o.min(created_at)));
        }
        debug!(source=%self.id, until=?until, len, oldest=?oldest, "ingest.page.stored");
        Ok((len, oldest, newest))
    }
}

#[async_trait::async_trait]
impl Actor for SourceIngestActor {
    type Msg = IngestCmd;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> anyhow::Result<()> {
        match msg {
            IngestCmd::RunCycle { reply } => {
                debug!(source=%self.id, cursor=?self.cursor, backlog=?self.backlog, "ingest.cycle.start");
                let res = self.run_cycle().await;
                match &res {
                    Ok(r) => info!(
                        source=%self.id,
                        fetches = r.fetches,
                        fetched = r.fetched,
                        inserted = r.inserted,
                        duplicates = r.duplicates,
                        skipped = r.skipped,
                        cursor=?r.cursor,
                        backlog_until=?r.backlog_until,
                        "ingest.cycle.done"
                    ),
                    Err(e) => warn!(source=%self.id, error=%e, "ingest.cycle.failed"),
                }
                if reply.send(res).is_err() {
                    debug!(source=%self.id, "ingest.reply_dropped");
                }
            }
        }
        // Cycle failures are reported to the caller; the actor keeps running.
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

/// Outcome of one cycle over several sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub reports: Vec<CycleReport>,
    pub failures: Vec<SourceFailure>,
}

impl IngestSummary {
    /// Errors only when every source failed.
    pub fn into_result(self) -> anyhow::Result<Self> {
        if self.reports.is_empty() {
            if let Some(first) = self.failures.first() {
                return Err(anyhow!(
                    "all {} sources failed; {}: {}",
                    self.failures.len(),
                    first.source_id,
                    first.error
                ));
            }
        }
        Ok(self)
    }
}

/// One cycle per source, in order. A failing source is logged and recorded
/// without stopping the others.
pub async fn run_cycles<'a, I>(sources: I) -> IngestSummary
where
    I: IntoIterator<Item = (&'a str, &'a Addr<SourceIngestActor>)>,
{
    let mut summary = IngestSummary::default();
    for (source_id, addr) in sources {
        match run_cycle(addr).await {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(source=%source_id, error=%e, "ingest.source.failed");
                summary.failures.push(SourceFailure {
                    source_id: source_id.to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }
    summary
}

/// Ask an ingestion actor for one cycle and wait for its report.
pub async fn run_cycle(addr: &Addr<SourceIngestActor>) -> anyhow::Result<CycleReport> {
    let (tx, rx) = oneshot::channel();
    addr.send(IngestCmd::RunCycle { reply: tx })
        .await
        .map_err(|_| anyhow!("ingest actor stopped"))?;
    let report = rx.await.map_err(|_| anyhow!("ingest actor dropped the request"))??;
    Ok(report)
}

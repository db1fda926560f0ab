//! LLM enrichment job.
//!
//! Each batch loads posts that were never analyzed, asks the LLM for
//! sentiment, product mentions and category hints, and writes the result back.
//! A failed call leaves the post keyword-only; it is offered again in a later
//! batch until its attempts run out.
use crate::actor::{Actor, Addr, Context};
use crate::categorize::KeywordCategorizer;
use crate::rate::{self, RateKey, RateLimiter};
use crate::store::{self, AnalysisRecord, StoreActor, StoreMsg};
use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vibe_common::{Post, Result, Sentiment, VibeError};
use vibe_llm::LlmClient;

/// Consecutive LLM failures after which the rest of the batch is abandoned.
const MAX_CONSECUTIVE_FAILURES: usize = 3;

pub enum AnalysisCmd {
    RunBatch {
        reply: oneshot::Sender<Result<BatchReport>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub low_confidence: usize,
}

pub struct AnalysisActor {
    llm: Arc<dyn LlmClient>,
    categorizer: Arc<KeywordCategorizer>,
    store: Addr<StoreActor>,
    rate: Option<(Addr<RateLimiter>, RateKey)>,
    batch_size: u32,
    min_confidence: f64,
}

impl AnalysisActor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        categorizer: Arc<KeywordCategorizer>,
        store: Addr<StoreActor>,
    ) -> Self {
        Self {
            llm,
            categorizer,
            store,
            rate: None,
            batch_size: 5,
            min_confidence: 0.7,
        }
    }

    pub fn with_rate_limit(mut self, limiter: Addr<RateLimiter>, key: RateKey) -> Self {
        self.rate = Some((limiter, key));
        self
    }

    pub fn with_batch_size(mut self, n: u32) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn with_min_confidence(mut self, c: f64) -> Self {
        self.min_confidence = c.clamp(0.0, 1.0);
        self
    }

    async fn analyze(&self, post: &Post, categories: &[String]) -> Result<AnalysisRecord> {
        if let Some((limiter, key)) = &self.rate {
            rate::acquire(limiter, key, 1)
                .await
                .map_err(|e| VibeError::unavailable("rate-limiter", e))?;
        }
        let analysis = self.llm.analyze_post(&post.content_text, categories).await?;

        let sentiment = if analysis.confidence < self.min_confidence {
            Sentiment::Neutral
        } else {
            analysis.sentiment
        };
        Ok(AnalysisRecord {
            sentiment,
            categories: self.categorizer.retain_known(&analysis.categories),
            analysis,
        })
    }

    async fn run_batch(&self) -> Result<BatchReport> {
        let posts = store::ask(&self.store, |reply| StoreMsg::PendingAnalysis {
            limit: self.batch_size,
            reply,
        })
        .await?;
        let categories = self.categorizer.categories();
        let mut report = BatchReport::default();
        let mut consecutive_failures = 0;

        for post in posts {
            report.attempted += 1;
            let record = match self.analyze(&post, &categories).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(post_id=%post.id, error=%e, "analysis.post.failed");
                    report.failed += 1;
                    let id = post.id;
                    store::ask(&self.store, |reply| StoreMsg::AnalysisFailed { id, reply }).await?;
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(e);
                    }
                    continue;
                }
            };
            consecutive_failures = 0;
            if record.sentiment != record.analysis.sentiment {
                report.low_confidence += 1;
            }

            let id = post.id;
            let merged =
                store::ask(&self.store, |reply| StoreMsg::RecordAnalysis { id, record, reply }).await?;
            debug!(post_id=%id, categories=?merged, "analysis.post.recorded");
            report.analyzed += 1;
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
impl Actor for AnalysisActor {
    type Msg = AnalysisCmd;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> anyhow::Result<()> {
        match msg {
            AnalysisCmd::RunBatch { reply } => {
                let res = self.run_batch().await;
                match &res {
                    Ok(r) => info!(
                        model = self.llm.model_name(),
                        attempted = r.attempted,
                        analyzed = r.analyzed,
                        failed = r.failed,
                        low_confidence = r.low_confidence,
                        "analysis.batch.done"
                    ),
                    Err(e) => warn!(model = self.llm.model_name(), error=%e, "analysis.batch.failed"),
                }
                if reply.send(res).is_err() {
                    debug!("analysis.reply_dropped");
                }
            }
        }
        Ok(())
    }
}

pub async fn run_batch(addr: &Addr<AnalysisActor>) -> anyhow::Result<BatchReport> {
    let (tx, rx) = oneshot::channel();
    addr.send(AnalysisCmd::RunBatch { reply: tx })
        .await
        .map_err(|_| anyhow!("analysis actor stopped"))?;
    let report = rx.await.map_err(|_| anyhow!("analysis actor dropped the request"))??;
    Ok(report)
}

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use vibe_actors::{
    actor::{Addr, Reserved},
    analysis::{self, AnalysisActor},
    builder::Builder,
    ingest::{self, SourceIngestActor},
    rate::{RateKey, RateLimiter, RateMsg},
    scheduler::spawn_interval_job,
    store::{self, StoreActor, StoreMsg},
    CategoryRuleset, KeywordCategorizer, PostStore, RecategorizeReport,
};
use vibe_api::{AppState, SourceInfo};
use vibe_common::Platform;
use vibe_config::{LlmConfig, RateSpec, SourceDetails, SourceSpec, VibeConfig};
use vibe_llm::{LlmClient, OpenAiClient};
use vibe_social::{
    PostSource,
    reddit::{RedditApi, RedditCredentials, RedditSource},
    twitter::{TwitterApi, TwitterSource},
};

const INFRA_MAILBOX: usize = 1024;
const JOB_MAILBOX: usize = 16;
const RATE_NAME: &str = "rate:main";
const STORE_NAME: &str = "store:main";
const ANALYSIS_NAME: &str = "analysis:main";

/// The wired actor graph plus what the API and CLI need to reach it.
pub struct App {
    builder: Builder,
    cfg: VibeConfig,
    store: PostStore,
    categorizer: Arc<KeywordCategorizer>,
    store_addr: Addr<StoreActor>,
    sources: Vec<(String, Addr<SourceIngestActor>)>,
    analysis: Option<Addr<AnalysisActor>>,
}

fn rate_upsert(key: RateKey, spec: &RateSpec) -> RateMsg {
    RateMsg::Upsert {
        key,
        qps: spec.qps,
        burst: spec.burst,
    }
}

pub fn build_categorizer(cfg: &VibeConfig) -> Result<Arc<KeywordCategorizer>> {
    let ruleset = CategoryRuleset::new(
        cfg.categories.version.clone(),
        cfg.categories.keywords.clone(),
    );
    let categorizer = KeywordCategorizer::new(ruleset)?;
    Ok(Arc::new(categorizer))
}

pub fn build_source(spec: &SourceSpec) -> Result<Box<dyn PostSource>> {
    match &spec.details {
        SourceDetails::Reddit { config } => {
            let creds = RedditCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                user_agent: config.user_agent.clone(),
            };
            let api = RedditApi::with_endpoints(creds, &config.auth_url, &config.api_base)
                .with_context(|| format!("source {}", spec.id))?;
            let source = RedditSource::new(api, config.subreddit.clone())
                .with_search_keywords(config.search_keywords.iter().cloned());
            Ok(Box::new(source))
        }
        SourceDetails::Twitter { config } => {
            let api = TwitterApi::with_base_url(&config.api_base, config.auth_token.clone())
                .with_context(|| format!("source {}", spec.id))?;
            Ok(Box::new(TwitterSource::new(
                api,
                config.query.clone(),
                spec.source_name(),
            )))
        }
    }
}

pub fn build_llm_client(cfg: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match cfg {
        LlmConfig::Openai {
            model,
            auth_token,
            temperature,
            max_tokens,
            endpoint,
            ..
        } => {
            let client = OpenAiClient::with_endpoint(auth_token.clone(), model.clone(), endpoint)?
                .with_generation(*temperature, *max_tokens);
            Ok(Arc::new(client))
        }
    }
}

pub fn source_infos(cfg: &VibeConfig) -> Vec<SourceInfo> {
    cfg.sources
        .iter()
        .map(|s| SourceInfo {
            id: s.id.clone(),
            platform: s.platform().to_string(),
            source_name: s.source_name().to_string(),
            enabled: s.enabled,
            interval_secs: s.interval(&cfg.scheduler).as_secs(),
        })
        .collect()
}

fn platform_of(spec: &SourceSpec) -> Platform {
    match spec.details {
        SourceDetails::Reddit { .. } => Platform::Reddit,
        SourceDetails::Twitter { .. } => Platform::Twitter,
    }
}

impl App {
    pub async fn build(cfg: VibeConfig) -> Result<Self> {
        let mut b = Builder::new();
        let categorizer = build_categorizer(&cfg)?;
        let store = PostStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("opening {}", cfg.database_url))?;

        // -------- PHASE 1: RESERVE EVERYTHING --------
        let r_rate = b.reserve::<RateLimiter>(RATE_NAME, INFRA_MAILBOX);
        let r_store = b.reserve::<StoreActor>(STORE_NAME, INFRA_MAILBOX);
        let mut r_sources: HashMap<String, Reserved<SourceIngestActor>> = HashMap::new();
        for spec in cfg.enabled_sources() {
            let name = format!("ingest:{}", spec.id);
            r_sources.insert(spec.id.clone(), b.reserve(&name, JOB_MAILBOX));
        }
        let r_analysis = cfg
            .llm
            .as_ref()
            .map(|_| b.reserve::<AnalysisActor>(ANALYSIS_NAME, JOB_MAILBOX));

        // -------- PHASE 2a: START INFRA FIRST --------
        b.start_reserved(r_rate, RateLimiter::new());
        b.start_reserved(r_store, StoreActor::new(store.clone()));
        let rate_addr: Addr<RateLimiter> =
            b.addr(RATE_NAME).ok_or_else(|| anyhow!("rate limiter not registered"))?;
        let store_addr: Addr<StoreActor> =
            b.addr(STORE_NAME).ok_or_else(|| anyhow!("store not registered"))?;

        // -------- PHASE 2b: PROVISION RATE LIMITS --------
        for spec in cfg.enabled_sources() {
            if let Some(rate) = &spec.rate {
                rate_addr
                    .send(rate_upsert(RateKey::source(&spec.id), rate))
                    .await
                    .map_err(|_| anyhow!("rate limiter stopped"))?;
            }
        }
        let llm_key = cfg.llm.as_ref().map(|llm| match llm {
            LlmConfig::Openai { model, .. } => RateKey::llm(model),
        });
        if let (Some(key), Some(rate)) = (&llm_key, cfg.llm.as_ref().and_then(LlmConfig::rate)) {
            rate_addr
                .send(rate_upsert(key.clone(), rate))
                .await
                .map_err(|_| anyhow!("rate limiter stopped"))?;
        }

        // -------- PHASE 2c: START JOB ACTORS (deps injected) --------
        let mut sources = Vec::new();
        for spec in cfg.enabled_sources() {
            let Some(reserved) = r_sources.remove(&spec.id) else {
                continue;
            };
            let addr = reserved.addr();
            // Resume from the newest stored post so restarts do not refetch history.
            let cursor = store
                .latest_created_at(platform_of(spec), spec.source_name())
                .await?;
            let actor = SourceIngestActor::new(
                spec.id.clone(),
                build_source(spec)?,
                categorizer.clone(),
                store_addr.clone(),
            )
            .with_rate_limit(rate_addr.clone(), RateKey::source(&spec.id))
            .with_cursor(cursor)
            .with_max_per_fetch(cfg.scheduler.max_posts_per_fetch);
            b.start_reserved(reserved, actor);
            tracing::info!(source=%spec.id, platform = spec.platform(), cursor=?cursor, "wiring.source.started");
            sources.push((spec.id.clone(), addr));
        }

        let mut analysis = None;
        if let (Some(reserved), Some(llm_cfg), Some(key)) = (r_analysis, &cfg.llm, llm_key) {
            let client = build_llm_client(llm_cfg)?;
            let addr = reserved.addr();
            let actor = AnalysisActor::new(client, categorizer.clone(), store_addr.clone())
                .with_rate_limit(rate_addr.clone(), key)
                .with_batch_size(u32::try_from(cfg.scheduler.analysis_batch_size).unwrap_or(u32::MAX))
                .with_min_confidence(cfg.scheduler.min_confidence);
            b.start_reserved(reserved, actor);
            analysis = Some(addr);
        } else {
            tracing::warn!("wiring.llm.disabled");
        }

        Ok(Self {
            builder: b,
            cfg,
            store,
            categorizer,
            store_addr,
            sources,
            analysis,
        })
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(id, _)| id.as_str())
    }

    /// One ingestion cycle per selected source, in configuration order. Fails
    /// only when every selected source failed.
    pub async fn ingest_once(&self, only: Option<&str>) -> Result<ingest::IngestSummary> {
        let selected: Vec<_> = self
            .sources
            .iter()
            .filter(|(id, _)| only.is_none_or(|o| o == id))
            .collect();
        if selected.is_empty() {
            return Err(match only {
                Some(id) => anyhow!("no enabled source with id {id:?}"),
                None => anyhow!("no enabled sources configured"),
            });
        }
        ingest::run_cycles(selected.into_iter().map(|(id, addr)| (id.as_str(), addr)))
            .await
            .into_result()
    }

    pub async fn analyze_once(&self) -> Result<analysis::BatchReport> {
        let addr = self
            .analysis
            .as_ref()
            .ok_or_else(|| anyhow!("no llm configured"))?;
        analysis::run_batch(addr).await
    }

    pub async fn recategorize(&self) -> Result<RecategorizeReport> {
        let categorizer = self.categorizer.clone();
        let report = store::ask(&self.store_addr, |reply| StoreMsg::Recategorize {
            categorizer,
            reply,
        })
        .await?;
        Ok(report)
    }

    pub fn store(&self) -> &PostStore {
        &self.store
    }

    /// Schedule every job and the API, then run until CTRL-C.
    pub async fn serve(mut self) -> Result<()> {
        let shutdown = self.builder.shutdown_handle();
        let backoff = self.cfg.scheduler.failure_backoff();

        for spec in self.cfg.enabled_sources() {
            let Some((_, addr)) = self.sources.iter().find(|(id, _)| id == &spec.id) else {
                continue;
            };
            let addr = addr.clone();
            let job = spawn_interval_job(
                format!("ingest:{}", spec.id),
                spec.interval(&self.cfg.scheduler),
                backoff,
                shutdown.subscribe(),
                move || {
                    let addr = addr.clone();
                    async move { ingest::run_cycle(&addr).await.map(|_| ()) }
                },
            );
            self.builder.track(async move { job.await? });
        }

        if let Some(addr) = self.analysis.clone() {
            let job = spawn_interval_job(
                "analysis",
                self.cfg.scheduler.analysis_interval(),
                backoff,
                shutdown.subscribe(),
                move || {
                    let addr = addr.clone();
                    async move { analysis::run_batch(&addr).await.map(|_| ()) }
                },
            );
            self.builder.track(async move { job.await? });
        }

        let state = Arc::new(AppState {
            store: self.store.clone(),
            categorizer: self.categorizer.clone(),
            sources: source_infos(&self.cfg),
        });
        let bind = self.cfg.api.bind.clone();
        let api_shutdown = shutdown.subscribe();
        let server = tokio::spawn(async move {
            let res = vibe_api::serve(&bind, state, api_shutdown).await;
            if res.is_err() {
                // A dead listener takes the whole process down with it.
                shutdown.signal();
            }
            res
        });
        self.builder.track(async move { server.await? });

        tracing::info!(
            sources = self.sources.len(),
            analysis = self.analysis.is_some(),
            "wiring.serving"
        );
        self.builder.run_until_ctrl_c().await
    }

    pub async fn shutdown(self) -> Result<()> {
        self.builder.graceful_shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibe_config::VibeConfigLoader;

    const YAML: &str = r#"
scheduler:
  fetch_interval_secs: 600
categories:
  version: "7"
  keywords:
    cursor: ["cursor"]
sources:
  - id: reddit-webdev
    kind: reddit
    interval_secs: 120
    config:
      subreddit: webdev
      client_id: id
      client_secret: secret
      search_keywords: ["cursor"]
  - id: tw-cursor
    kind: twitter
    enabled: false
    config:
      query: cursor editor
      auth_token: token
"#;

    #[test]
    fn source_infos_resolve_names_and_intervals() {
        let cfg = VibeConfigLoader::new().with_yaml_str(YAML).load().unwrap();
        let infos = source_infos(&cfg);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].source_name, "webdev");
        assert_eq!(infos[0].interval_secs, 120);
        assert_eq!(infos[1].platform, "twitter");
        assert_eq!(infos[1].source_name, "tw-cursor");
        assert_eq!(infos[1].interval_secs, 600);
        assert!(!infos[1].enabled);
    }

    #[test]
    fn builds_clients_and_categorizer_from_config() {
        let cfg = VibeConfigLoader::new().with_yaml_str(YAML).load().unwrap();
        let categorizer = build_categorizer(&cfg).unwrap();
        assert!(categorizer.tag().starts_with("7+"));
        for spec in &cfg.sources {
            let source = build_source(spec).unwrap();
            assert_eq!(source.source_name(), spec.source_name());
        }
    }

    #[tokio::test]
    async fn one_shot_commands_fail_cleanly_without_sources_or_llm() {
        let mut cfg = VibeConfigLoader::new().with_yaml_str(YAML).load().unwrap();
        cfg.database_url = "sqlite::memory:".into();
        cfg.sources.clear();
        let app = App::build(cfg).await.unwrap();
        assert!(app.ingest_once(None).await.is_err());
        assert!(app.analyze_once().await.is_err());
        let report = app.recategorize().await.unwrap();
        assert_eq!(report.scanned, 0);
        app.shutdown().await.unwrap();
    }
}

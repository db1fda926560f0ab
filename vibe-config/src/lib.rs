//! Loader for CommunityVibe configuration with YAML + environment overlays.
//!
//! Sources are merged in order: an optional YAML file (or inline YAML in
//! tests), then `VIBE__`-prefixed environment variables (`VIBE__API__BIND`
//! overrides `api.bind`). String values may reference other variables as
//! `${VAR}`; references are expanded recursively after merging.
//!
//! ```yaml
//! database_url: "sqlite://communityvibe.db?mode=rwc"
//! categories:
//!   version: "2024-06"
//!   keywords:
//!     vscode: ["vs code", "vscode"]
//! sources:
//!   - id: reddit-webdev
//!     kind: reddit
//!     config:
//!       subreddit: webdev
//!       client_id: "${REDDIT_CLIENT_ID}"
//!       client_secret: "${REDDIT_CLIENT_SECRET}"
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "VIBE";

#[derive(Debug, Clone, Deserialize)]
pub struct VibeConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub stderr: bool,
    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            dir: None,
            stderr: true,
            format: default_log_format(),
            filter: default_filter(),
        }
    }
}

/// Periodic job knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub analysis_batch_size: usize,
    #[serde(default = "default_max_posts")]
    pub max_posts_per_fetch: usize,
    /// LLM sentiment below this confidence is stored as neutral.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_backoff_base")]
    pub failure_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_interval_secs: default_fetch_interval(),
            analysis_interval_secs: default_analysis_interval(),
            analysis_batch_size: default_batch_size(),
            max_posts_per_fetch: default_max_posts(),
            min_confidence: default_min_confidence(),
            failure_backoff_secs: default_backoff_base(),
        }
    }
}

impl SchedulerConfig {
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    Openai {
        model: String,
        auth_token: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
        #[serde(default)]
        rate: Option<RateSpec>,
    },
}

impl LlmConfig {
    pub fn rate(&self) -> Option<&RateSpec> {
        match self {
            LlmConfig::Openai { rate, .. } => rate.as_ref(),
        }
    }
}

/// Versioned keyword ruleset, category name to keyword list.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default = "default_ruleset_version")]
    pub version: String,
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            version: default_ruleset_version(),
            keywords: BTreeMap::new(),
        }
    }
}

/// Token-bucket settings for one upstream.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct RateSpec {
    pub qps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

/// Shared fields plus the per-kind details.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Falls back to `scheduler.fetch_interval_secs`.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub rate: Option<RateSpec>,
    #[serde(flatten)]
    pub details: SourceDetails,
}

impl SourceSpec {
    pub fn platform(&self) -> &'static str {
        match self.details {
            SourceDetails::Reddit { .. } => "reddit",
            SourceDetails::Twitter { .. } => "twitter",
        }
    }

    /// Value stored in `Post::source_name` for items fetched by this source.
    pub fn source_name(&self) -> &str {
        match &self.details {
            SourceDetails::Reddit { config } => &config.subreddit,
            SourceDetails::Twitter { config } => config.label.as_deref().unwrap_or(&self.id),
        }
    }

    pub fn interval(&self, scheduler: &SchedulerConfig) -> Duration {
        Duration::from_secs(self.interval_secs.unwrap_or(scheduler.fetch_interval_secs))
    }
}

/// The tag is `kind`; the payload lives in `config`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceDetails {
    Reddit { config: RedditConfig },
    Twitter { config: TwitterConfig },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditConfig {
    pub subreddit: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_reddit_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_reddit_api_base")]
    pub api_base: String,
    /// Extra in-subreddit searches run alongside `/new` each cycle.
    #[serde(default)]
    pub search_keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterConfig {
    /// Recent-search query, e.g. `"cursor code editor" -is:retweet`.
    pub query: String,
    pub auth_token: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_twitter_api_base")]
    pub api_base: String,
}

fn default_database_url() -> String {
    "sqlite://communityvibe.db?mode=rwc".into()
}
fn default_bind() -> String {
    "127.0.0.1:8000".into()
}
fn default_app_name() -> String {
    "communityvibe".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}
fn default_fetch_interval() -> u64 {
    3600
}
fn default_analysis_interval() -> u64 {
    7200
}
fn default_batch_size() -> usize {
    5
}
fn default_max_posts() -> usize {
    25
}
fn default_min_confidence() -> f64 {
    0.7
}
fn default_backoff_base() -> u64 {
    30
}
fn default_burst() -> u32 {
    1
}
fn default_ruleset_version() -> String {
    "1".into()
}
fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_user_agent() -> String {
    concat!("communityvibe/", env!("CARGO_PKG_VERSION")).into()
}
fn default_reddit_auth_url() -> String {
    "https://www.reddit.com/api/v1/access_token".into()
}
fn default_reddit_api_base() -> String {
    "https://oauth.reddit.com/".into()
}
fn default_twitter_api_base() -> String {
    "https://api.twitter.com/2/".into()
}

/// Per-user default location, `~/.config/communityvibe/vibe.yaml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("communityvibe").join("vibe.yaml"))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

impl VibeConfig {
    /// Reject configurations that would only fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(invalid("source id must not be empty"));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(invalid(format!("duplicate source id: {}", source.id)));
            }
            if source.interval_secs == Some(0) {
                return Err(invalid(format!("source {}: interval_secs must be > 0", source.id)));
            }
            if let Some(rate) = &source.rate {
                check_rate(&source.id, rate)?;
            }
        }

        for (name, keywords) in &self.categories.keywords {
            if name.trim().is_empty() {
                return Err(invalid("category names must not be empty"));
            }
            if keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(invalid(format!("category {name}: keywords must not be empty")));
            }
        }

        let s = &self.scheduler;
        if s.fetch_interval_secs == 0 || s.analysis_interval_secs == 0 {
            return Err(invalid("scheduler intervals must be > 0"));
        }
        if s.analysis_batch_size == 0 || s.max_posts_per_fetch == 0 {
            return Err(invalid("scheduler batch sizes must be > 0"));
        }
        if !(0.0..=1.0).contains(&s.min_confidence) {
            return Err(invalid("scheduler.min_confidence must be within 0..=1"));
        }
        if let Some(rate) = self.llm.as_ref().and_then(LlmConfig::rate) {
            check_rate("llm", rate)?;
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

fn check_rate(owner: &str, rate: &RateSpec) -> Result<(), ConfigError> {
    if !(rate.qps.is_finite() && rate.qps > 0.0) || rate.burst == 0 {
        return Err(invalid(format!("{owner}: rate needs qps > 0 and burst >= 1")));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Message(msg.into())
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct VibeConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for VibeConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VibeConfigLoader {
    /// Start empty; `VIBE__` environment overrides are layered on top at [`Self::load`].
    ///
    /// ```
    /// use vibe_config::VibeConfigLoader;
    ///
    /// let config = VibeConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nsources: []")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.scheduler.fetch_interval_secs, 3600);
    /// assert!(config.sources.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for env-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use vibe_config::{SourceDetails, VibeConfigLoader};
    ///
    /// let cfg = VibeConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// sources:
    ///   - id: "tw-cursor"
    ///     kind: "twitter"
    ///     config:
    ///       query: "cursor code editor"
    ///       auth_token: "example"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.sources.len(), 1);
    /// assert_eq!(cfg.sources[0].source_name(), "tw-cursor");
    /// assert!(matches!(cfg.sources[0].details, SourceDetails::Twitter { .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders, deserialize and validate.
    pub fn load(self) -> Result<VibeConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: VibeConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}

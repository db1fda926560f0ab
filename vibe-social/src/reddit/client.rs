//! Reddit OAuth client for application-only ("client credentials") access.
//!
//! A bearer token is fetched from the token endpoint with HTTP Basic auth and
//! cached until shortly before it expires. Listing calls go to
//! `oauth.reddit.com` with that token and the configured User-Agent, which
//! Reddit requires to be unique and descriptive.
use std::borrow::Cow;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use vibe_common::{Platform, RawPost, Result, VibeError};
use vibe_http::{Auth, HttpClient, HttpError, RequestOpts};

use crate::reddit::types::{Listing, TokenResponse};
use crate::source::PostSource;

pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com/";
const PAGE_MAX: usize = 100;
const MAX_PAGES: usize = 10;
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct RedditApi {
    http: HttpClient,
    auth_url: String,
    creds: RedditCredentials,
    user_agent: HeaderValue,
    token: Mutex<Option<CachedToken>>,
}

impl RedditApi {
    pub fn new(creds: RedditCredentials) -> Result<Self> {
        Self::with_endpoints(creds, REDDIT_AUTH_URL, REDDIT_API_BASE)
    }

    pub fn with_endpoints(creds: RedditCredentials, auth_url: &str, api_base: &str) -> Result<Self> {
        if creds.client_id.trim().is_empty() || creds.client_secret.trim().is_empty() {
            return Err(VibeError::Config("reddit client_id/client_secret must be set".into()));
        }
        let user_agent = HeaderValue::from_str(&creds.user_agent)
            .map_err(|e| VibeError::Config(format!("invalid reddit user agent: {e}")))?;
        let http = HttpClient::new(api_base)
            .map_err(|e| VibeError::Config(format!("reddit api base: {e}")))?;
        Ok(Self {
            http,
            auth_url: auth_url.to_string(),
            creds,
            user_agent,
            token: Mutex::new(None),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers
    }

    async fn access_token(&self) -> std::result::Result<String, HttpError> {
        let mut guard = self.token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if Instant::now() < tok.expires_at {
                return Ok(tok.value.clone());
            }
        }

        let opts = RequestOpts {
            auth: Some(Auth::Basic {
                username: &self.creds.client_id,
                password: &self.creds.client_secret,
            }),
            headers: Some(self.headers()),
            allow_absolute: true,
            ..Default::default()
        };
        let resp: TokenResponse = self
            .http
            .post_form_opts(&self.auth_url, &[("grant_type", "client_credentials")], opts)
            .await?;

        let ttl = Duration::from_secs(resp.expires_in).saturating_sub(TOKEN_SLACK);
        tracing::debug!(ttl_secs = ttl.as_secs(), token_type = ?resp.token_type, "reddit.token.refreshed");
        *guard = Some(CachedToken {
            value: resp.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(resp.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn listing_page(
        &self,
        subreddit: &str,
        path: &str,
        extra: &[(&'static str, String)],
        limit: usize,
        after: Option<&str>,
    ) -> std::result::Result<Listing, HttpError> {
        let mut refreshed = false;
        loop {
            let token = self.access_token().await?;
            let mut query: Vec<(&str, Cow<'_, str>)> = vec![
                ("limit", limit.min(PAGE_MAX).to_string().into()),
                ("raw_json", "1".into()),
            ];
            query.extend(extra.iter().map(|(k, v)| (*k, Cow::from(v.as_str()))));
            if let Some(after) = after {
                query.push(("after", after.into()));
            }
            let opts = RequestOpts {
                auth: Some(Auth::Bearer(&token)),
                headers: Some(self.headers()),
                query: Some(query),
                ..Default::default()
            };
            match self.http.get_json::<Listing>(path, opts).await {
                Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) && !refreshed => {
                    tracing::info!(%subreddit, "reddit.token.rejected");
                    self.invalidate_token().await;
                    refreshed = true;
                }
                other => return other,
            }
        }
    }

    /// Walk a newest-first listing, keeping `t3` submissions inside `window`.
    ///
    /// Items newer than `until` are skipped; the walk stops at the first item
    /// older than `since`.
    async fn walk(
        &self,
        subreddit: &str,
        path: &str,
        extra: &[(&'static str, String)],
        window: Window,
        limit: usize,
    ) -> std::result::Result<Vec<serde_json::Value>, HttpError> {
        let mut out = Vec::new();
        let mut after: Option<String> = None;

        'pages: for _ in 0..MAX_PAGES {
            let remaining = limit.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            // While skipping past newer items, take full pages.
            let page_size = if window.until.is_some() { PAGE_MAX } else { remaining };
            let listing = self
                .listing_page(subreddit, path, extra, page_size, after.as_deref())
                .await?;
            for child in listing.data.children {
                if child.kind != "t3" {
                    continue;
                }
                if let Some(created) = child.data.get("created_utc").and_then(|v| v.as_f64()) {
                    if window.since.is_some_and(|since| created < since) {
                        break 'pages;
                    }
                    if window.until.is_some_and(|until| created > until) {
                        continue;
                    }
                }
                out.push(child.data);
                if out.len() >= limit {
                    break 'pages;
                }
            }
            after = listing.data.after;
            if after.is_none() {
                break;
            }
        }
        Ok(out)
    }

    /// Newest `t3` submissions of a subreddit authored within `[since, until]`.
    pub async fn new_posts(
        &self,
        subreddit: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> std::result::Result<Vec<serde_json::Value>, HttpError> {
        let path = format!("r/{subreddit}/new");
        self.walk(subreddit, &path, &[], Window::new(since, until), limit)
            .await
    }

    /// Subreddit search for `query`, newest first, restricted to `[since, until]`.
    pub async fn search(
        &self,
        subreddit: &str,
        query: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> std::result::Result<Vec<serde_json::Value>, HttpError> {
        let path = format!("r/{subreddit}/search");
        let extra = [
            ("q", query.to_string()),
            ("restrict_sr", "1".to_string()),
            ("sort", "new".to_string()),
            ("type", "link".to_string()),
        ];
        self.walk(subreddit, &path, &extra, Window::new(since, until), limit)
            .await
    }
}

/// Inclusive `created_utc` bounds, in fractional epoch seconds as Reddit sends them.
#[derive(Debug, Clone, Copy, Default)]
struct Window {
    since: Option<f64>,
    until: Option<f64>,
}

impl Window {
    fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            since: since.map(epoch_secs),
            until: until.map(epoch_secs),
        }
    }
}

fn epoch_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6
}

fn created_utc(item: &serde_json::Value) -> f64 {
    item.get("created_utc")
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::MIN)
}

/// One subreddit polled as a source, optionally widened by keyword searches.
pub struct RedditSource {
    api: RedditApi,
    subreddit: String,
    search_keywords: Vec<String>,
}

impl RedditSource {
    pub fn new(api: RedditApi, subreddit: impl Into<String>) -> Self {
        Self {
            api,
            subreddit: subreddit.into(),
            search_keywords: Vec::new(),
        }
    }

    /// Also search the subreddit for each keyword, catching posts that
    /// scrolled off `/new` between polls.
    pub fn with_search_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .collect();
        self
    }
}

#[async_trait]
impl PostSource for RedditSource {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    fn source_name(&self) -> &str {
        &self.subreddit
    }

    async fn fetch_window(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RawPost>> {
        let unavailable = |e: HttpError| VibeError::unavailable("reddit", e);
        let mut items = self
            .api
            .new_posts(&self.subreddit, since, until, limit)
            .await
            .map_err(unavailable)?;

        if !self.search_keywords.is_empty() {
            for keyword in &self.search_keywords {
                let found = self
                    .api
                    .search(&self.subreddit, keyword, since, until, limit)
                    .await
                    .map_err(unavailable)?;
                tracing::debug!(subreddit=%self.subreddit, %keyword, found = found.len(), "reddit.search.done");
                items.extend(found);
            }
            // Each stream holds its newest `limit` items, so the newest `limit`
            // of the union leaves no gap above the oldest one kept.
            let mut seen = HashSet::new();
            items.retain(|item| {
                let id = item.get("id").and_then(|v| v.as_str()).map(str::to_string);
                id.is_none_or(|id| seen.insert(id))
            });
            items.sort_by(|a, b| created_utc(b).total_cmp(&created_utc(a)));
            items.truncate(limit);
        }

        tracing::debug!(subreddit=%self.subreddit, fetched = items.len(), "reddit.fetch_window.done");
        Ok(items
            .into_iter()
            .map(|payload| RawPost {
                platform: Platform::Reddit,
                source_name: self.subreddit.clone(),
                payload,
            })
            .collect())
    }
}

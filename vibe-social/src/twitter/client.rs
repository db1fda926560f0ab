//! Thin wrapper around the Twitter/X v2 recent-search endpoint.
//!
//! Recent search only covers the last seven days and rejects windows that end
//! less than ten seconds before "now", so every request carries an explicit,
//! clamped `[start_time, end_time]` window.
use std::borrow::Cow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use vibe_common::{Platform, RawPost, Result, VibeError};
use vibe_http::{Auth, HttpClient, HttpError, RequestOpts};

use crate::source::PostSource;
use crate::twitter::types::{Includes, SearchResponse, Tweet};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com/2/";
const SEARCH_PATH: &str = "tweets/search/recent";
const TWEET_FIELDS: &str = "created_at,lang,conversation_id,public_metrics,possibly_sensitive,entities,author_id";
const USER_FIELDS: &str = "username,name";
const MAX_PAGES: usize = 5;

#[derive(Clone, Debug)]
pub struct TwitterApi {
    http: HttpClient,
    bearer: String,
}

impl TwitterApi {
    pub fn new(bearer_token: String) -> Result<Self> {
        Self::with_base_url(TWITTER_API_BASE, bearer_token)
    }

    pub fn with_base_url(base: &str, bearer_token: String) -> Result<Self> {
        let http = HttpClient::new(base).map_err(|e| VibeError::Config(format!("twitter base url: {e}")))?;
        Ok(Self {
            http,
            bearer: bearer_token,
        })
    }

    /// One page of recent search results inside `[start, end)`; build the
    /// window with [`search_window`] and reuse it while following `next_token`.
    pub async fn recent_search(
        &self,
        query: &str,
        max_results: u32,
        (start, end): (OffsetDateTime, OffsetDateTime),
        next_token: Option<&str>,
    ) -> std::result::Result<SearchResponse, HttpError> {
        let max_results = max_results.clamp(10, 100);

        let mut params: Vec<(&str, Cow<'_, str>)> = vec![
            ("query", query.into()),
            ("max_results", max_results.to_string().into()),
            ("tweet.fields", TWEET_FIELDS.into()),
            ("expansions", "author_id".into()),
            ("user.fields", USER_FIELDS.into()),
            ("start_time", rfc3339(start).into()),
            ("end_time", rfc3339(end).into()),
        ];
        if let Some(token) = next_token {
            params.push(("next_token", token.into()));
        }

        let resp: SearchResponse = self
            .http
            .get_json(
                SEARCH_PATH,
                RequestOpts {
                    auth: Some(Auth::Bearer(&self.bearer)),
                    query: Some(params),
                    ..Default::default()
                },
            )
            .await?;

        tracing::debug!(
            result_count = ?resp.meta.as_ref().and_then(|m| m.result_count),
            has_next = resp.meta.as_ref().is_some_and(|m| m.next_token.is_some()),
            "twitter.search.page"
        );
        Ok(resp)
    }
}

/// `[start, end)` window covering `[since, until]` that the recent-search
/// endpoint will accept, or `None` when nothing of it lies in the last week.
///
/// Both ends have whole-second granularity: `start` rounds down and `end`
/// lands one second past `until`, so tweets on either bound are included.
pub fn search_window(
    now: OffsetDateTime,
    since: Option<OffsetDateTime>,
    until: Option<OffsetDateTime>,
) -> Option<(OffsetDateTime, OffsetDateTime)> {
    // Slack on both ends keeps us clear of the server's own clock.
    let latest = now - Duration::seconds(20);
    let earliest = now - Duration::days(7) + Duration::minutes(1);
    let start = match since {
        Some(s) if s > earliest => s,
        _ => earliest,
    };
    let end = match until {
        Some(u) => (u + Duration::seconds(1)).min(latest),
        None => latest,
    };
    (whole_seconds(start) < whole_seconds(end)).then_some((start, end))
}

fn whole_seconds(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(0).unwrap_or(t)
}

/// Whole-second RFC 3339; the API rejects fractional seconds.
fn rfc3339(t: OffsetDateTime) -> String {
    whole_seconds(t).format(&Rfc3339).unwrap_or_default()
}

pub(crate) fn chrono_to_offset(dt: DateTime<Utc>) -> Result<OffsetDateTime> {
    let nanos = dt
        .timestamp_nanos_opt()
        .ok_or_else(|| VibeError::Config(format!("timestamp out of range: {dt}")))?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos.into())
        .map_err(|e| VibeError::Config(format!("cannot convert timestamp {dt}: {e}")))
}

/// A configured search query polled as one source.
pub struct TwitterSource {
    api: TwitterApi,
    query: String,
    source_name: String,
}

impl TwitterSource {
    pub fn new(api: TwitterApi, query: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            api,
            query: query.into(),
            source_name: source_name.into(),
        }
    }

    fn to_raw(&self, tweet: Tweet, includes: &Includes) -> Result<RawPost> {
        let author: Vec<_> = tweet
            .author_id
            .as_deref()
            .and_then(|id| includes.user(id))
            .into_iter()
            .cloned()
            .collect();
        let data = serde_json::to_value(&tweet)
            .map_err(|e| VibeError::malformed(Platform::Twitter, e.to_string()))?;
        let payload = json!({ "data": data, "includes": { "users": author } });
        Ok(RawPost {
            platform: Platform::Twitter,
            source_name: self.source_name.clone(),
            payload,
        })
    }
}

#[async_trait]
impl PostSource for TwitterSource {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn fetch_window(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<RawPost>> {
        let since_ts = since.map(chrono_to_offset).transpose()?;
        let until_ts = until.map(chrono_to_offset).transpose()?;
        let Some(window) = search_window(OffsetDateTime::now_utc(), since_ts, until_ts) else {
            tracing::debug!(source=%self.source_name, ?since, ?until, "twitter.fetch_window.out_of_range");
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut next_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let remaining = limit.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            let page = self
                .api
                .recent_search(&self.query, remaining as u32, window, next_token.as_deref())
                .await
                .map_err(|e| VibeError::unavailable("twitter", e))?;

            let includes = page.includes.unwrap_or_default();
            // The API returns at least ten per page; anything past `remaining`
            // is older than what we keep and comes back on the next, narrower call.
            let in_window = page
                .data
                .unwrap_or_default()
                .into_iter()
                .filter(|t| within(t, since, until))
                .take(remaining);
            for tweet in in_window {
                out.push(self.to_raw(tweet, &includes)?);
            }

            next_token = page.meta.and_then(|m| m.next_token);
            if next_token.is_none() {
                break;
            }
        }

        tracing::debug!(source=%self.source_name, fetched = out.len(), "twitter.fetch_window.done");
        Ok(out)
    }
}

/// Second-granular API bounds can overshoot `[since, until]`; tweets without a
/// parseable timestamp are kept for the normalizer to reject.
fn within(tweet: &Tweet, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> bool {
    let Some(created) = tweet
        .created_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|d| d.with_timezone(&Utc))
    else {
        return true;
    };
    since.is_none_or(|s| created >= s) && until.is_none_or(|u| created <= u)
}

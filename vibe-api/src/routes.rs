use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use vibe_actors::{Page, PostCounts, PostFilter, SortOrder};
use vibe_common::{Platform, Post, Sentiment, VibeError};

use crate::error::ApiError;
use crate::{AppState, SourceInfo};

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

// --- Query structs ---

#[derive(Debug, Default, Deserialize)]
pub struct PostsQuery {
    category: Option<String>,
    /// Comma-separated platform names.
    platform: Option<String>,
    source_name: Option<String>,
    sentiment: Option<String>,
    since: Option<String>,
    until: Option<String>,
    order: Option<String>,
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostsPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub version: String,
    pub ruleset: String,
    pub categories: Vec<String>,
}

// --- Helpers ---

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_platforms(raw: &str) -> Result<Vec<Platform>, ApiError> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let platform: Platform = part.parse().map_err(ApiError::bad_request)?;
        if !out.contains(&platform) {
            out.push(platform);
        }
    }
    Ok(out)
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` meaning midnight UTC.
fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "invalid {field} {raw:?}: expected RFC 3339 or YYYY-MM-DD"
            ))
        })
}

impl PostsQuery {
    fn into_filter(self, state: &AppState) -> Result<(PostFilter, Page), ApiError> {
        let category = match non_empty(&self.category) {
            Some(c) if !state.categorizer.is_known(c) => {
                return Err(ApiError::BadRequest {
                    message: format!("unknown category {c:?}"),
                    available: Some(state.categorizer.categories()),
                });
            }
            other => other.map(str::to_string),
        };
        let platforms = match non_empty(&self.platform) {
            Some(raw) => parse_platforms(raw)?,
            None => Vec::new(),
        };
        let sentiment = non_empty(&self.sentiment)
            .map(|s| s.parse::<Sentiment>())
            .transpose()
            .map_err(ApiError::bad_request)?;
        let since = non_empty(&self.since)
            .map(|s| parse_time("since", s))
            .transpose()?;
        let until = non_empty(&self.until)
            .map(|s| parse_time("until", s))
            .transpose()?;
        if let (Some(since), Some(until)) = (since, until) {
            if since >= until {
                return Err(ApiError::bad_request("since must be before until"));
            }
        }
        let order = non_empty(&self.order)
            .map(|s| s.parse::<SortOrder>())
            .transpose()
            .map_err(ApiError::bad_request)?
            .unwrap_or_default();

        let filter = PostFilter {
            platforms,
            category,
            source_name: non_empty(&self.source_name).map(str::to_string),
            sentiment,
            since,
            until,
        };
        let page = Page {
            offset: self.offset.unwrap_or(0),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            order,
        };
        Ok((filter, page))
    }
}

// --- Handlers ---

pub async fn health() -> &'static str {
    "ok"
}

pub async fn api_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PostsQuery>,
) -> Result<Json<PostsPage>, ApiError> {
    let (filter, page) = params.into_filter(&state)?;
    let total = state.store.count(&filter).await?;
    let posts = state.store.query(&filter, &page).await?;
    debug!(filter = ?filter, total, returned = posts.len(), "api.posts");
    Ok(Json(PostsPage {
        total,
        offset: page.offset,
        limit: page.limit,
        posts,
    }))
}

pub async fn api_post_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid post id {id:?}")))?;
    let post = state
        .store
        .get(id)
        .await?
        .ok_or(VibeError::PostNotFound(id))?;
    Ok(Json(post))
}

pub async fn api_post_counts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PostCounts>, ApiError> {
    Ok(Json(state.store.counts().await?))
}

pub async fn api_categories(State(state): State<Arc<AppState>>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        version: state.categorizer.version().to_string(),
        ruleset: state.categorizer.tag().to_string(),
        categories: state.categorizer.categories(),
    })
}

pub async fn api_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceInfo>> {
    Json(state.sources.clone())
}

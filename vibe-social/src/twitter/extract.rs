use chrono::{DateTime, Utc};
use serde_json::json;
use vibe_common::{NewPost, Platform, RawPost, Result, VibeError};

use crate::twitter::types::{Includes, Tweet};

fn malformed(reason: impl Into<String>) -> VibeError {
    VibeError::malformed(Platform::Twitter, reason)
}

/// Convert `{ "data": Tweet, "includes": { "users": [...] } }` into a [`NewPost`].
///
/// The author must be resolvable through `includes.users`; without a
/// username there is no canonical status URL.
pub fn normalize_tweet(raw: &RawPost) -> Result<NewPost> {
    let data = raw.payload.get("data").cloned().ok_or_else(|| malformed("missing data"))?;
    let tweet: Tweet = serde_json::from_value(data).map_err(|e| malformed(format!("bad tweet: {e}")))?;
    let includes: Includes = raw
        .payload
        .get("includes")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| malformed(format!("bad includes: {e}")))?
        .unwrap_or_default();

    if tweet.id.trim().is_empty() {
        return Err(malformed("empty tweet id"));
    }
    let text = tweet.text.trim();
    if text.is_empty() {
        return Err(malformed(format!("tweet {} has no text", tweet.id)));
    }

    let author_id = tweet
        .author_id
        .as_deref()
        .ok_or_else(|| malformed(format!("tweet {} has no author_id", tweet.id)))?;
    let author = includes
        .user(author_id)
        .ok_or_else(|| malformed(format!("author {author_id} not in includes")))?;

    let created_at = tweet
        .created_at
        .as_deref()
        .ok_or_else(|| malformed(format!("tweet {} has no created_at", tweet.id)))?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|e| malformed(format!("bad created_at {created_at:?}: {e}")))?
        .with_timezone(&Utc);

    let hashtags: Vec<&str> = tweet
        .entities
        .as_ref()
        .and_then(|e| e.hashtags.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|h| h.tag.as_str())
        .collect();

    let additional_data = json!({
        "twitter": {
            "author_name": author.name,
            "lang": tweet.lang,
            "conversation_id": tweet.conversation_id,
            "possibly_sensitive": tweet.possibly_sensitive,
            "public_metrics": tweet.public_metrics,
            "hashtags": hashtags,
        }
    });

    Ok(NewPost {
        platform: Platform::Twitter,
        external_id: tweet.id.clone(),
        platform_url: format!("https://twitter.com/{}/status/{}", author.username, tweet.id),
        source_name: raw.source_name.clone(),
        author_username: Some(author.username.clone()),
        author_platform_id: Some(author.id.clone()),
        content_text: text.to_string(),
        categories: Vec::new(),
        ruleset_version: None,
        additional_data,
        created_at,
    })
}

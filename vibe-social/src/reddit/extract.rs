use chrono::{DateTime, Utc};
use serde_json::json;
use vibe_common::{NewPost, Platform, RawPost, Result, VibeError};

use crate::reddit::types::Submission;

fn malformed(reason: impl Into<String>) -> VibeError {
    VibeError::malformed(Platform::Reddit, reason)
}

/// Authors that no longer resolve to an account.
const DELETED_AUTHOR: &str = "[deleted]";

/// Convert the `data` object of a `t3` listing child into a [`NewPost`].
pub fn normalize_submission(raw: &RawPost) -> Result<NewPost> {
    let sub: Submission = serde_json::from_value(raw.payload.clone())
        .map_err(|e| malformed(format!("bad submission: {e}")))?;

    if sub.id.trim().is_empty() {
        return Err(malformed("empty submission id"));
    }

    let title = sub.title.trim();
    let body = sub.selftext.trim();
    let content_text = match (title.is_empty(), body.is_empty()) {
        (true, true) => return Err(malformed(format!("submission {} has no text", sub.id))),
        (false, true) => title.to_string(),
        (true, false) => body.to_string(),
        (false, false) => format!("{title}\n\n{body}"),
    };

    if !sub.created_utc.is_finite() || sub.created_utc < 0.0 {
        return Err(malformed(format!("bad created_utc {}", sub.created_utc)));
    }
    let secs = sub.created_utc.trunc() as i64;
    let nanos = ((sub.created_utc - sub.created_utc.trunc()) * 1e9) as u32;
    let created_at: DateTime<Utc> = DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| malformed(format!("created_utc out of range: {}", sub.created_utc)))?;

    if !sub.permalink.starts_with('/') {
        return Err(malformed(format!("unexpected permalink {:?}", sub.permalink)));
    }

    let author_username = sub
        .author
        .as_deref()
        .filter(|a| !a.is_empty() && *a != DELETED_AUTHOR)
        .map(str::to_string);

    let additional_data = json!({
        "reddit": {
            "fullname": sub.name,
            "score": sub.score,
            "upvote_ratio": sub.upvote_ratio,
            "num_comments": sub.num_comments,
            "over_18": sub.over_18,
            "link_flair_text": sub.link_flair_text,
            "domain": sub.domain,
            "url": sub.url,
            "is_self": sub.is_self,
        }
    });

    Ok(NewPost {
        platform: Platform::Reddit,
        external_id: sub.id.clone(),
        platform_url: format!("https://www.reddit.com{}", sub.permalink),
        source_name: raw.source_name.clone(),
        author_username,
        author_platform_id: sub.author_fullname.clone(),
        content_text,
        categories: Vec::new(),
        ruleset_version: None,
        additional_data,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn raw(payload: Value) -> RawPost {
        RawPost {
            platform: Platform::Reddit,
            source_name: "webdev".into(),
            payload,
        }
    }

    fn sample() -> Value {
        json!({
            "id": "1abcde",
            "name": "t3_1abcde",
            "title": "VS Code vs Cursor for webdev?",
            "selftext": "Been using vscode for years.",
            "is_self": true,
            "created_utc": 1717243200.0,
            "permalink": "/r/webdev/comments/1abcde/vs_code_vs_cursor/",
            "subreddit": "webdev",
            "author": "dev_dan",
            "author_fullname": "t2_xyz",
            "score": 12,
            "upvote_ratio": 0.93,
            "num_comments": 7,
            "over_18": false,
            "domain": "self.webdev",
            "url": "https://www.reddit.com/r/webdev/comments/1abcde/vs_code_vs_cursor/"
        })
    }

    #[test]
    fn joins_title_and_selftext() {
        let post = normalize_submission(&raw(sample())).unwrap();
        assert_eq!(
            post.content_text,
            "VS Code vs Cursor for webdev?\n\nBeen using vscode for years."
        );
        assert_eq!(post.created_at, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(
            post.platform_url,
            "https://www.reddit.com/r/webdev/comments/1abcde/vs_code_vs_cursor/"
        );
        assert_eq!(post.author_username.as_deref(), Some("dev_dan"));
        assert_eq!(post.additional_data["reddit"]["num_comments"], 7);
    }

    #[test]
    fn link_posts_use_title_only_and_deleted_authors_are_dropped() {
        let mut payload = sample();
        payload["selftext"] = json!("");
        payload["is_self"] = json!(false);
        payload["author"] = json!("[deleted]");
        let post = normalize_submission(&raw(payload)).unwrap();
        assert_eq!(post.content_text, "VS Code vs Cursor for webdev?");
        assert_eq!(post.author_username, None);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let mut payload = sample();
        payload.as_object_mut().unwrap().remove("created_utc");
        assert!(normalize_submission(&raw(payload)).unwrap_err().is_skippable());

        let mut payload = sample();
        payload["title"] = json!("");
        payload["selftext"] = json!(" ");
        assert!(normalize_submission(&raw(payload)).unwrap_err().is_skippable());
    }
}

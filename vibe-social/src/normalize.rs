use vibe_common::{NewPost, Platform, RawPost, Result};

use crate::{reddit, twitter};

/// Map a platform payload onto the canonical post shape.
///
/// Pure and deterministic: the same payload always yields the same
/// [`NewPost`]. Categories are left empty for the categorizer to fill.
pub fn normalize(raw: &RawPost) -> Result<NewPost> {
    match raw.platform {
        Platform::Reddit => reddit::extract::normalize_submission(raw),
        Platform::Twitter => twitter::extract::normalize_tweet(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_payloads_normalize_identically() {
        let raw = RawPost {
            platform: Platform::Reddit,
            source_name: "programming".into(),
            payload: json!({
                "id": "x1",
                "title": "Rust 2024 edition is out",
                "created_utc": 1717243200.5,
                "permalink": "/r/programming/comments/x1/rust/"
            }),
        };
        let a = normalize(&raw).unwrap();
        let b = normalize(&raw.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.created_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn platform_tag_selects_extractor() {
        let reddit_shaped = RawPost {
            platform: Platform::Twitter,
            source_name: "q".into(),
            payload: json!({ "id": "x1", "title": "t", "created_utc": 1.0, "permalink": "/r/a/" }),
        };
        assert!(normalize(&reddit_shaped).unwrap_err().is_skippable());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"kind": "Listing", "data": {...}}` as returned by `/r/{sub}/new`.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
    #[serde(default)]
    pub after: Option<String>,
}

/// A listing child. Submissions have kind `t3`; `data` is kept raw so the
/// normalizer sees exactly what the API sent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Thing {
    pub kind: String,
    pub data: Value,
}

/// Fields of a `t3` submission the normalizer relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub is_self: bool,
    pub created_utc: f64,
    pub permalink: String,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_fullname: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: Option<u64>,
    #[serde(default)]
    pub over_18: Option<bool>,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

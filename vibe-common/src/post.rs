//! Canonical post model shared by the clients, the store and the API.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Social platform a post was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    Twitter,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Reddit, Platform::Twitter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Overall tone of a post as judged by the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "mixed" => Ok(Sentiment::Mixed),
            other => Err(format!("unknown sentiment: {other}")),
        }
    }
}

/// Platform-specific payload exactly as a client fetched it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    pub platform: Platform,
    /// Subreddit or configured Twitter source label the item was fetched for.
    pub source_name: String,
    pub payload: serde_json::Value,
}

impl RawPost {
    /// Best-effort external id for log lines; normalization does the real validation.
    pub fn external_id_hint(&self) -> Option<&str> {
        match self.platform {
            Platform::Reddit => self.payload.get("id"),
            Platform::Twitter => self.payload.get("data").and_then(|d| d.get("id")),
        }
        .and_then(|v| v.as_str())
    }
}

/// A normalized post that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPost {
    pub platform: Platform,
    pub external_id: String,
    pub platform_url: String,
    pub source_name: String,
    pub author_username: Option<String>,
    pub author_platform_id: Option<String>,
    pub content_text: String,
    pub categories: Vec<String>,
    /// Tag of the keyword ruleset that produced `categories`.
    pub ruleset_version: Option<String>,
    pub additional_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A stored post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub platform: Platform,
    pub external_id: String,
    pub platform_url: String,
    pub source_name: String,
    pub author_username: Option<String>,
    pub author_platform_id: Option<String>,
    pub content_text: String,
    pub categories: Vec<String>,
    pub ruleset_version: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub analysis: Option<PostAnalysis>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub additional_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// A product the LLM found mentioned in a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductMention {
    pub name: String,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub context: Option<String>,
}

/// LLM enrichment stored alongside a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostAnalysis {
    pub sentiment: Sentiment,
    pub confidence: f64,
    #[serde(default)]
    pub products: Vec<ProductMention>,
    /// Category hints proposed by the model; only configured ones are merged into the post.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub model: Option<String>,
}

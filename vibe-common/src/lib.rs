//! Common types and utilities shared across the CommunityVibe crates.
//!
//! This crate defines the canonical post model, the shared error type and the
//! logging initialiser used by every binary and integration test. It stays
//! lightweight so that every crate in the workspace can depend on it.
//!
//! # Overview
//!
//! - [`post`]: [`Platform`], [`RawPost`], [`NewPost`], [`Post`] and the LLM
//!   enrichment types
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`VibeError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use vibe_common::{Platform, VibeError};
//!
//! let platform: Platform = "reddit".parse().unwrap();
//! assert_eq!(platform, Platform::Reddit);
//!
//! let err = VibeError::malformed(Platform::Twitter, "missing id");
//! assert!(err.is_skippable());
//! ```
use uuid::Uuid;

pub mod observability;
pub mod post;

pub use post::{
    NewPost, Platform, Post, PostAnalysis, ProductMention, RawPost, Sentiment,
};

/// Error types used across the CommunityVibe system.
///
/// Failures are scoped to the smallest unit that can absorb them: a malformed
/// payload skips one item, an unavailable service fails one source cycle, and a
/// storage failure fails one ingestion cycle.
#[derive(thiserror::Error, Debug)]
pub enum VibeError {
    /// A platform client returned an item that cannot be normalized.
    #[error("malformed {platform} payload: {reason}")]
    MalformedPayload { platform: Platform, reason: String },

    /// Reddit, Twitter or the LLM provider failed or timed out.
    #[error("{service} unavailable: {message}")]
    ExternalServiceUnavailable { service: String, message: String },

    /// The database rejected or could not serve a request.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced post could not be located.
    #[error("post not found: {0}")]
    PostNotFound(Uuid),
}

impl VibeError {
    pub fn malformed(platform: Platform, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            platform,
            reason: reason.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalServiceUnavailable {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageFailure(err.to_string())
    }

    /// True when the failure only concerns a single item and the batch should continue.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }
}

/// Convenient alias for results that use [`VibeError`].
pub type Result<T> = std::result::Result<T, VibeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_malformed_payloads_are_skippable() {
        assert!(VibeError::malformed(Platform::Reddit, "no title").is_skippable());
        assert!(!VibeError::unavailable("reddit", "503").is_skippable());
        assert!(!VibeError::storage("disk full").is_skippable());
    }

    #[test]
    fn error_messages_name_the_failing_party() {
        let err = VibeError::unavailable("twitter", "rate limited");
        assert_eq!(err.to_string(), "twitter unavailable: rate limited");

        let err = VibeError::malformed(Platform::Reddit, "missing created_utc");
        assert_eq!(
            err.to_string(),
            "malformed reddit payload: missing created_utc"
        );
    }
}

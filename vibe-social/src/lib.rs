//! Platform clients and post normalization for CommunityVibe.
//!
//! - [`reddit`]: app-only OAuth client for subreddit listings
//! - [`twitter`]: v2 recent-search client
//! - [`source::PostSource`]: the seam the ingestion actors poll through
//! - [`normalize::normalize`]: raw platform payload to [`vibe_common::NewPost`]
pub mod normalize;
pub mod reddit;
pub mod source;
pub mod twitter;

pub use normalize::normalize;
pub use source::PostSource;

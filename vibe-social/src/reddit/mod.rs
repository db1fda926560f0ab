//! Reddit integration: OAuth client, listing types and submission extraction.
pub mod client;
pub mod extract;
pub mod types;

pub use client::{RedditApi, RedditCredentials, RedditSource};

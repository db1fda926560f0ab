//! Twitter/X recent-search client, response types and tweet extraction.
pub mod client;
pub mod extract;
pub mod types;

pub use client::{TwitterApi, TwitterSource};

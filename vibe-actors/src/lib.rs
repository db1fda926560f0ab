//! Actor runtime and background jobs for CommunityVibe.
//!
//! - [`actor`], [`builder`], [`system`]: bounded-mailbox actors, two-phase
//!   wiring and broadcast shutdown
//! - [`rate`]: token-bucket rate limiter shared by every external call
//! - [`categorize`]: versioned keyword categorizer
//! - [`store`]: SQLite post store and its actor front
//! - [`ingest`], [`analysis`], [`scheduler`]: the periodic ingestion and LLM
//!   enrichment jobs
pub mod actor;
pub mod analysis;
pub mod builder;
pub mod categorize;
pub mod ingest;
pub mod rate;
pub mod scheduler;
pub mod store;
pub mod system;

pub use categorize::{CategoryRuleset, KeywordCategorizer};
pub use store::{
    AnalysisRecord, Page, PostCounts, PostFilter, PostStore, RecategorizeReport, SortOrder,
    UpsertOutcome,
};

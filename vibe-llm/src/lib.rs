//! LLM integration for CommunityVibe post analysis.
//!
//! [`traits::LlmClient`] is the provider-agnostic seam the analysis job talks
//! to; [`openai::OpenAiClient`] implements it over the OpenAI Responses API.
//! [`analysis`] turns free-form model replies into a
//! [`vibe_common::PostAnalysis`].
//!
//! ```no_run
//! use vibe_llm::{LlmClient, OpenAiClient};
//!
//! # async fn demo() -> vibe_common::Result<()> {
//! let client = OpenAiClient::new("sk-...".into(), vibe_llm::DEFAULT_OPENAI_MODEL.into())?;
//! let analysis = client
//!     .analyze_post("Cursor keeps crashing on save", &["cursor".to_string()])
//!     .await?;
//! println!("{:?}", analysis.sentiment);
//! # Ok(())
//! # }
//! ```
pub mod analysis;
pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, LlmResponse};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

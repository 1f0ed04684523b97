//! askweb - orchestration core for AI-synthesized web search answers.
//!
//! A query submitted by the UI triggers a web search, a lazy model load and a
//! token-streaming generation run, all coordinated by [`pipeline::Orchestrator`]
//! and observable through the typed channels in [`state::AppChannels`]. The
//! concrete inference runtime and search retrieval mechanism are collaborators
//! behind the [`runtime::InferenceRuntime`] and [`provider::SearchProvider`]
//! traits.

pub mod config;
pub mod display;
pub mod error;
pub mod generate;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod runtime;
pub mod search;
pub mod state;

pub use config::{Config, ModelProfile, SamplingConfig};
pub use error::PipelineError;
pub use pipeline::Orchestrator;
pub use state::{AppChannels, SearchResult, SearchState, TextGenerationState};

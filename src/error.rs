//! Error types for the answer pipeline.

use std::fmt;

/// Errors surfaced by the pipeline stages.
///
/// Each stage converts its internal failure into the matching variant instead
/// of propagating raw errors upward; the orchestrator maps the variant to a
/// terminal channel state. `InvalidState` is a contract violation inside the
/// core, not a user-facing condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Web search could not be completed (network or provider error).
    SearchFailure(String),
    /// Model download or initialization failed.
    ModelLoadFailure(String),
    /// Inference runtime failed mid-generation.
    GenerationFailure(String),
    /// Operation invoked out of sequence.
    InvalidState(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SearchFailure(msg) => write!(f, "Search failed: {}", msg),
            Self::ModelLoadFailure(msg) => write!(f, "Model load failed: {}", msg),
            Self::GenerationFailure(msg) => write!(f, "Generation failed: {}", msg),
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_remain_distinguishable() {
        let search = PipelineError::SearchFailure("timeout".into());
        let generation = PipelineError::GenerationFailure("oom".into());
        assert!(search.to_string().starts_with("Search failed"));
        assert!(generation.to_string().starts_with("Generation failed"));
        assert_ne!(search.to_string(), generation.to_string());
    }
}

//! Inference runtime collaborator contract.
//!
//! The concrete runtime (a WASM llama wrapper in the browser build) lives
//! outside this crate; the pipeline only sees it through [`InferenceRuntime`].

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{CacheType, SamplingConfig};
use crate::error::PipelineError;

/// Runtime-level knobs derived from the selected model profile.
#[derive(Clone, Debug)]
pub struct LoadConfig {
    pub context_size: u32,
    pub cache_type: CacheType,
    pub n_threads: usize,
}

/// Download/initialization progress callback, 0-100.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Lazy, finite, non-restartable sequence of generated token texts.
///
/// An `Err` item ends the stream with a runtime failure; dropping the stream
/// tells the runtime to stop producing.
pub type TokenStream = BoxStream<'static, Result<String, PipelineError>>;

#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Downloads and initializes the model, reporting progress along the way.
    /// Progress must reach 100 before a successful return.
    async fn load(
        &self,
        model_url: &str,
        config: LoadConfig,
        on_progress: ProgressFn,
    ) -> Result<(), PipelineError>;

    /// Starts streaming a completion for `prompt`. Sampling parameters are
    /// forwarded verbatim; `stop_strings` end the stream with a normal
    /// completion.
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        stop_strings: &[&str],
    ) -> TokenStream;

    async fn unload(&self) -> Result<(), PipelineError>;
}

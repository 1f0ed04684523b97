use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::Mutex as TokioMutex;

use crate::config::SamplingConfig;
use crate::error::PipelineError;
use crate::model::ModelManager;
use crate::runtime::InferenceRuntime;

/// How a generation run ended. Runtime errors are reported separately as
/// [`PipelineError::GenerationFailure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    Interrupted,
}

/// Cooperative stop signal for an in-flight generation.
///
/// Once requested it stays requested; each run gets a fresh handle.
#[derive(Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives token-by-token streaming generation against the loaded model.
pub struct GenerationStage {
    runtime: Arc<dyn InferenceRuntime>,
    model: Arc<ModelManager>,
    // The runtime hosts a single model instance; runs take this for the
    // lifetime of their stream so a superseded run has fully released the
    // runtime before the next one starts.
    gate: TokioMutex<()>,
}

impl GenerationStage {
    pub fn new(runtime: Arc<dyn InferenceRuntime>, model: Arc<ModelManager>) -> Self {
        Self {
            runtime,
            model,
            gate: TokioMutex::new(()),
        }
    }

    /// Streams a completion for `prompt`, feeding each token to `on_token`.
    ///
    /// Runs are serialized: a call made while another stream is in flight
    /// waits until that stream has been dropped. The interrupt is checked on
    /// every token step; after it is acknowledged no further `on_token` call
    /// happens and the partial output stands. Requesting generation before
    /// the model is loaded is a programming error, not a user-facing failure.
    pub async fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
        stop_strings: &[&str],
        interrupt: &Interrupt,
        mut on_token: impl FnMut(&str),
    ) -> Result<GenerationOutcome, PipelineError> {
        if !self.model.is_loaded().await {
            return Err(PipelineError::InvalidState(
                "generation requested before model load".into(),
            ));
        }

        let _running = self.gate.lock().await;
        let mut tokens = 0usize;
        let mut stream = self.runtime.generate(prompt, sampling, stop_strings);
        loop {
            if interrupt.is_requested() {
                debug!("Generation interrupted after {} tokens", tokens);
                return Ok(GenerationOutcome::Interrupted);
            }
            match stream.next().await {
                Some(Ok(token)) => {
                    // The stop may have been requested while this token was
                    // being produced; drop it rather than deliver late.
                    if interrupt.is_requested() {
                        debug!("Generation interrupted after {} tokens", tokens);
                        return Ok(GenerationOutcome::Interrupted);
                    }
                    on_token(&token);
                    tokens += 1;
                    // Keep the event loop responsive between tokens.
                    tokio::task::yield_now().await;
                }
                Some(Err(e)) => {
                    warn!("Generation failed after {} tokens: {}", tokens, e);
                    return Err(PipelineError::GenerationFailure(e.to_string()));
                }
                None => {
                    debug!("Generation completed with {} tokens", tokens);
                    return Ok(GenerationOutcome::Completed);
                }
            }
        }
    }
}

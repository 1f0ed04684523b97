//! Pipeline orchestrator.
//!
//! Ties the search, model lifecycle and generation stages into one flow per
//! submitted query. Transition logic is a pure table over
//! (state, event) pairs; presentation lives separately in `display`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{error, info};

use crate::config::Config;
use crate::generate::{GenerationOutcome, GenerationStage, Interrupt};
use crate::model::ModelManager;
use crate::prompt;
use crate::provider::SearchProvider;
use crate::runtime::InferenceRuntime;
use crate::search::SearchStage;
use crate::state::{AppChannels, SearchState, TextGenerationState};

/// Identifies one pipeline run. Submitting a new query bumps the shared
/// counter, so every write of the superseded run can be discarded by checking
/// [`RunToken::is_current`].
#[derive(Clone)]
pub struct RunToken {
    epoch: u64,
    counter: Arc<AtomicU64>,
}

impl RunToken {
    fn next(counter: &Arc<AtomicU64>) -> Self {
        let epoch = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            epoch,
            counter: counter.clone(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.epoch
    }

    #[cfg(test)]
    pub(crate) fn standalone() -> Self {
        Self::next(&Arc::new(AtomicU64::new(0)))
    }

    #[cfg(test)]
    pub(crate) fn supersede(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything that can advance the pipeline state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    QuerySubmitted,
    SearchSucceeded { model_loaded: bool },
    SearchFailed { context_required: bool },
    ModelLoaded,
    ModelLoadFailed,
    GenerationStarted,
    InterruptRequested,
    StreamEnded,
    RuntimeErrored,
}

/// The transition table. Pairs not listed keep the current state; terminal
/// states only move again on a new query submission.
pub fn transition(state: TextGenerationState, event: PipelineEvent) -> TextGenerationState {
    use self::PipelineEvent as E;
    use crate::state::TextGenerationState as S;

    match (state, event) {
        (_, E::QuerySubmitted) => S::AwaitingSearchResults,
        (S::AwaitingSearchResults, E::SearchSucceeded { model_loaded: false }) => S::LoadingModel,
        (S::AwaitingSearchResults, E::SearchSucceeded { model_loaded: true }) => {
            S::PreparingToGenerate
        }
        (S::AwaitingSearchResults, E::SearchFailed { context_required: true }) => S::Failed,
        (S::AwaitingSearchResults, E::SearchFailed { context_required: false }) => {
            S::PreparingToGenerate
        }
        (S::LoadingModel, E::ModelLoaded) => S::PreparingToGenerate,
        (S::LoadingModel, E::ModelLoadFailed) => S::Failed,
        // The search-failure path reaches preparingToGenerate with the model
        // possibly still unloaded; a load failure there is terminal too.
        (S::PreparingToGenerate, E::ModelLoadFailed) => S::Failed,
        (S::PreparingToGenerate, E::GenerationStarted) => S::Generating,
        (S::Generating, E::InterruptRequested) => S::Interrupted,
        (S::Generating, E::StreamEnded) => S::Completed,
        (S::Generating, E::RuntimeErrored) => S::Failed,
        (state, _) => state,
    }
}

/// Sequences query submission, web search, lazy model load and streaming
/// generation, publishing every observable change to the shared channels.
pub struct Orchestrator {
    channels: Arc<AppChannels>,
    config: Config,
    search: SearchStage,
    model: Arc<ModelManager>,
    generation: GenerationStage,
    epoch: Arc<AtomicU64>,
    interrupt: StdMutex<Interrupt>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn SearchProvider>,
        runtime: Arc<dyn InferenceRuntime>,
    ) -> Arc<Self> {
        let channels = Arc::new(AppChannels::new());
        let model = Arc::new(ModelManager::new(
            runtime.clone(),
            channels.clone(),
            config.clone(),
        ));
        Arc::new(Self {
            search: SearchStage::new(provider, channels.clone()),
            generation: GenerationStage::new(runtime, model.clone()),
            model,
            channels,
            config,
            epoch: Arc::new(AtomicU64::new(0)),
            interrupt: StdMutex::new(Interrupt::new()),
        })
    }

    pub fn channels(&self) -> Arc<AppChannels> {
        self.channels.clone()
    }

    pub fn model(&self) -> Arc<ModelManager> {
        self.model.clone()
    }

    /// The user's stop button: asks the in-flight generation to halt. The
    /// partial response is kept.
    pub fn request_interrupt(&self) {
        self.interrupt.lock().unwrap().request();
    }

    /// Runs the whole pipeline for a newly submitted query.
    ///
    /// Any in-flight run is interrupted and its late writes discarded before
    /// downstream state is reset and the new run begins.
    pub async fn submit_query(&self, query: &str) {
        info!("Query submitted, starting pipeline run");
        let run = RunToken::next(&self.epoch);

        let interrupt = {
            let mut guard = self.interrupt.lock().unwrap();
            guard.request();
            let fresh = Interrupt::new();
            *guard = fresh.clone();
            fresh
        };

        self.channels.query.set(query.to_string());
        self.channels.search_state.set(SearchState::Idle);
        self.channels.search_results.set(Vec::new());
        self.channels.urls_descriptions.set(Default::default());
        self.channels.response.set(String::new());

        if self.config.disable_ai_response {
            self.channels
                .text_generation_state
                .set(TextGenerationState::Idle);
            let _ = self.search.run_search(query, &run).await;
            return;
        }

        self.apply_if_current(&run, PipelineEvent::QuerySubmitted);

        let search_ok = self.search.run_search(query, &run).await.is_ok();
        if !run.is_current() {
            return;
        }

        let state = if search_ok {
            let model_loaded = self.model.is_loaded().await;
            self.apply_if_current(&run, PipelineEvent::SearchSucceeded { model_loaded })
        } else {
            self.apply_if_current(
                &run,
                PipelineEvent::SearchFailed {
                    context_required: self.config.require_search_context,
                },
            )
        };
        if state == TextGenerationState::Failed {
            return;
        }

        // No-op when a previous run already loaded the model.
        let profile = match self.model.ensure_loaded().await {
            Ok(profile) => profile,
            Err(e) => {
                error!("{}", e);
                self.apply_if_current(&run, PipelineEvent::ModelLoadFailed);
                return;
            }
        };
        if !run.is_current() {
            return;
        }
        if self.channels.text_generation_state.get() == TextGenerationState::LoadingModel {
            self.apply_if_current(&run, PipelineEvent::ModelLoaded);
        }

        let spec = profile.spec();
        let context = prompt::format_search_context(
            &self.channels.search_results.get(),
            &self.channels.urls_descriptions.get(),
            spec.include_urls_in_prompt,
        );
        let prompt_text = (spec.build_prompt)(query, &context);

        self.apply_if_current(&run, PipelineEvent::GenerationStarted);
        if !run.is_current() {
            return;
        }

        let channels = self.channels.clone();
        let token_run = run.clone();
        let on_token = move |token: &str| {
            // The buffer only grows while this run is current and generating;
            // it is frozen the moment a terminal state is reached.
            if token_run.is_current()
                && channels.text_generation_state.get() == TextGenerationState::Generating
            {
                channels.response.update(|r| r.push_str(token));
            }
        };

        match self
            .generation
            .generate(
                &prompt_text,
                &spec.sampling,
                spec.stop_strings,
                &interrupt,
                on_token,
            )
            .await
        {
            Ok(GenerationOutcome::Completed) => {
                self.apply_if_current(&run, PipelineEvent::StreamEnded);
            }
            Ok(GenerationOutcome::Interrupted) => {
                self.apply_if_current(&run, PipelineEvent::InterruptRequested);
            }
            Err(e) => {
                error!("{}", e);
                self.apply_if_current(&run, PipelineEvent::RuntimeErrored);
            }
        }
    }

    fn apply_if_current(&self, run: &RunToken, event: PipelineEvent) -> TextGenerationState {
        let current = self.channels.text_generation_state.get();
        if !run.is_current() {
            return current;
        }
        let next = transition(current, event);
        if next != current {
            self.channels.text_generation_state.set(next);
        }
        next
    }
}

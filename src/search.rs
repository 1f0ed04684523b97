use std::sync::Arc;

use log::{debug, warn};

use crate::error::PipelineError;
use crate::pipeline::RunToken;
use crate::provider::SearchProvider;
use crate::state::{AppChannels, SearchResult, SearchState};

/// Runs the web search for one pipeline run and publishes its results.
pub struct SearchStage {
    provider: Arc<dyn SearchProvider>,
    channels: Arc<AppChannels>,
}

impl SearchStage {
    pub fn new(provider: Arc<dyn SearchProvider>, channels: Arc<AppChannels>) -> Self {
        Self { provider, channels }
    }

    /// Issues the search, transitions `SearchState`, and kicks off per-URL
    /// description fetches.
    ///
    /// Empty results are a valid completed search. An empty query counts as a
    /// provider error. Description fetches outlive this call; their results
    /// are dropped if `run` has been superseded by the time they resolve.
    pub async fn run_search(
        &self,
        query: &str,
        run: &RunToken,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        self.channels.search_state.set(SearchState::Running);
        self.channels.search_results.set(Vec::new());
        self.channels.urls_descriptions.set(Default::default());

        if query.trim().is_empty() {
            if run.is_current() {
                self.channels.search_state.set(SearchState::Failed);
            }
            return Err(PipelineError::SearchFailure("empty query".into()));
        }

        match self.provider.search(query).await {
            Ok(results) => {
                if !run.is_current() {
                    return Err(PipelineError::SearchFailure("superseded".into()));
                }
                debug!("Search returned {} results", results.len());
                self.channels.search_results.set(results.clone());
                self.channels.search_state.set(SearchState::Completed);
                self.spawn_description_fetches(&results, run);
                Ok(results)
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                if run.is_current() {
                    self.channels.search_state.set(SearchState::Failed);
                }
                Err(PipelineError::SearchFailure(e.to_string()))
            }
        }
    }

    /// Fire-and-forget description fetch per result URL, no ordering guarantee.
    fn spawn_description_fetches(&self, results: &[SearchResult], run: &RunToken) {
        for result in results {
            let provider = self.provider.clone();
            let channels = self.channels.clone();
            let run = run.clone();
            let url = result.url.clone();
            tokio::spawn(async move {
                match provider.describe(&url).await {
                    Ok(description) => {
                        // A newer query may have started while this fetch was
                        // in flight; its state must not absorb stale results.
                        if run.is_current() {
                            channels
                                .urls_descriptions
                                .update(|map| {
                                    map.insert(url, description);
                                });
                        }
                    }
                    Err(e) => debug!("Description fetch for {} failed: {}", url, e),
                }
            });
        }
    }
}

//! Pure presentation helpers over the pipeline state enums.
//!
//! Kept apart from the transition logic so the UI can query display strings
//! without touching the state machine.

use crate::state::{SearchState, TextGenerationState};

/// Guidance shown when generation ends in `failed`.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Could not generate response. It's possible that your browser or your system is out of memory.";

/// Guidance shown when the search ends in `failed`.
pub const SEARCH_FAILED_MESSAGE: &str = "It looks like your current search did not return any \
     results. Try refining your search by adding more keywords or rephrasing your query.";

/// Section title for the AI response area; `None` means render nothing.
pub fn generation_section_title(state: TextGenerationState) -> Option<&'static str> {
    match state {
        TextGenerationState::Idle => None,
        TextGenerationState::AwaitingSearchResults => Some("Awaiting search results..."),
        TextGenerationState::LoadingModel => Some("Loading AI..."),
        TextGenerationState::PreparingToGenerate => Some("Preparing AI response..."),
        TextGenerationState::Generating => Some("Generating AI Response..."),
        TextGenerationState::Interrupted => Some("AI Response (Interrupted)"),
        TextGenerationState::Completed | TextGenerationState::Failed => Some("AI Response"),
    }
}

/// Section title for the search results area; `None` means render nothing.
pub fn search_section_title(state: SearchState) -> Option<&'static str> {
    match state {
        SearchState::Idle => None,
        SearchState::Running => Some("Searching the web..."),
        SearchState::Failed | SearchState::Completed => Some("Search Results"),
    }
}

/// The failure guidance for a terminal state, if any. Search and generation
/// failures stay distinguishable so the UI can show the right advice.
pub fn failure_guidance(
    generation: TextGenerationState,
    search: SearchState,
) -> Option<&'static str> {
    if generation == TextGenerationState::Failed {
        Some(GENERATION_FAILED_MESSAGE)
    } else if search == SearchState::Failed {
        Some(SEARCH_FAILED_MESSAGE)
    } else {
        None
    }
}

/// True when the progress bar should render as settled rather than active.
/// Both 0 and 100 mean no download is in flight.
pub fn is_load_settled(progress: u8) -> bool {
    progress == 0 || progress == 100
}

//! Shared state channels.
//!
//! All communication between the pipeline stages and the UI goes through the
//! typed channels in [`AppChannels`]. Stages never call each other directly;
//! they read and write channels and react to transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// State of the web search for the current query.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SearchState {
    #[default]
    Idle,
    Running,
    Failed,
    Completed,
}

/// Phase of the answer pipeline, in pipeline order.
///
/// This is the single value the UI renders the AI response section from.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase")]
pub enum TextGenerationState {
    #[default]
    Idle,
    AwaitingSearchResults,
    LoadingModel,
    PreparingToGenerate,
    Generating,
    Interrupted,
    Completed,
    Failed,
}

/// One web search result, in provider relevance order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Handle returned by [`Channel::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// A named slot holding one current value, notifying subscribers on change.
///
/// Subscribers run synchronously inside `set`, in subscription order. A `set`
/// finishes notifying every subscriber before the next `set` on the same
/// channel proceeds. Callbacks must not `set` the channel they observe.
pub struct Channel<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> Channel<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> T {
        self.value.lock().unwrap().clone()
    }

    /// Replaces the value and notifies all subscribers with the new value.
    pub fn set(&self, value: T) {
        // The subscriber lock is held for the whole notification pass so
        // concurrent sets on the same channel cannot interleave.
        let mut subscribers = self.subscribers.lock().unwrap();
        *self.value.lock().unwrap() = value.clone();
        for (_, callback) in subscribers.iter_mut() {
            callback(&value);
        }
    }

    /// Mutates the value in place, then notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let value = {
            let mut guard = self.value.lock().unwrap();
            f(&mut guard);
            guard.clone()
        };
        for (_, callback) in subscribers.iter_mut() {
            callback(&value);
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Box::new(callback)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(existing, _)| *existing != id.0);
    }
}

/// Every channel the pipeline publishes to, created once at startup.
pub struct AppChannels {
    /// The user's current query text.
    pub query: Channel<String>,
    pub search_state: Channel<SearchState>,
    /// Results in provider relevance order; cleared on each new query.
    pub search_results: Channel<Vec<SearchResult>>,
    /// Url -> description text, filled in as description fetches complete.
    pub urls_descriptions: Channel<HashMap<String, String>>,
    pub text_generation_state: Channel<TextGenerationState>,
    /// Download/init percent, 0-100. 0 and 100 both mean "not actively loading".
    pub model_loading_progress: Channel<u8>,
    /// The accumulating generated answer.
    pub response: Channel<String>,
}

impl AppChannels {
    pub fn new() -> Self {
        Self {
            query: Channel::new(String::new()),
            search_state: Channel::new(SearchState::Idle),
            search_results: Channel::new(Vec::new()),
            urls_descriptions: Channel::new(HashMap::new()),
            text_generation_state: Channel::new(TextGenerationState::Idle),
            model_loading_progress: Channel::new(0),
            response: Channel::new(String::new()),
        }
    }
}

impl Default for AppChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_get_returns_current_value() {
        let channel = Channel::new(5u32);
        assert_eq!(channel.get(), 5);
        channel.set(7);
        assert_eq!(channel.get(), 7);
    }

    #[test]
    fn test_subscribers_called_in_subscription_order() {
        let channel = Channel::new(0u32);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        channel.subscribe(move |v| first.lock().unwrap().push(("first", *v)));
        let second = order.clone();
        channel.subscribe(move |v| second.lock().unwrap().push(("second", *v)));

        channel.set(1);
        channel.set(2);

        let calls = order.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let channel = Channel::new(0u32);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.set(1);
        channel.unsubscribe(id);
        channel.set(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_notifies_with_mutated_value() {
        let channel = Channel::new(String::from("ab"));
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        channel.subscribe(move |v| *sink.lock().unwrap() = v.clone());

        channel.update(|s| s.push('c'));

        assert_eq!(channel.get(), "abc");
        assert_eq!(*seen.lock().unwrap(), "abc");
    }

    #[test]
    fn test_channels_start_at_initial_values() {
        let channels = AppChannels::new();
        assert_eq!(channels.search_state.get(), SearchState::Idle);
        assert_eq!(
            channels.text_generation_state.get(),
            TextGenerationState::Idle
        );
        assert_eq!(channels.model_loading_progress.get(), 0);
        assert!(channels.search_results.get().is_empty());
        assert!(channels.response.get().is_empty());
    }

    #[test]
    fn test_generation_states_ordered_by_phase() {
        assert!(TextGenerationState::Idle < TextGenerationState::AwaitingSearchResults);
        assert!(TextGenerationState::AwaitingSearchResults < TextGenerationState::LoadingModel);
        assert!(TextGenerationState::PreparingToGenerate < TextGenerationState::Generating);
    }

    #[test]
    fn test_state_serializes_to_camel_case() {
        let json = serde_json::to_string(&TextGenerationState::AwaitingSearchResults).unwrap();
        assert_eq!(json, "\"awaitingSearchResults\"");
        let json = serde_json::to_string(&SearchState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}

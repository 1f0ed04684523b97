use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::state::SearchResult;

/// External search collaborator.
///
/// `search` returns results in relevance order; `describe` fetches a richer
/// description for one result URL and may be called long after the search
/// completed.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
    async fn describe(&self, url: &str) -> Result<String>;
}

/// HTTP search provider speaking a SearXNG-style JSON API.
pub struct RemoteSearchProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteSearchProvider {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchResponseItem>,
}

#[derive(Deserialize)]
struct SearchResponseItem {
    url: String,
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct DescribeResponse {
    description: String,
}

#[async_trait]
impl SearchProvider for RemoteSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| anyhow!("Search request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Search provider returned {}: {}", status, body));
        }

        let resp: SearchResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse search response: {}", e))?;

        Ok(resp
            .results
            .into_iter()
            .map(|item| SearchResult {
                url: item.url,
                title: item.title,
                snippet: item.content,
            })
            .collect())
    }

    async fn describe(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("describe", url), ("format", "json")])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| anyhow!("Description request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Description provider returned {}",
                response.status()
            ));
        }

        let resp: DescribeResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse description response: {}", e))?;

        if resp.description.trim().is_empty() {
            return Err(anyhow!("Provider returned empty description"));
        }

        Ok(resp.description)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Scripted provider for stage and pipeline tests.
    pub struct FakeSearchProvider {
        results: Vec<SearchResult>,
        descriptions: HashMap<String, String>,
        fail_search: bool,
        describe_delay: Option<Duration>,
        search_calls: AtomicU32,
    }

    impl FakeSearchProvider {
        pub fn returning(results: Vec<SearchResult>) -> Self {
            Self {
                results,
                descriptions: HashMap::new(),
                fail_search: false,
                describe_delay: None,
                search_calls: AtomicU32::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                results: Vec::new(),
                descriptions: HashMap::new(),
                fail_search: true,
                describe_delay: None,
                search_calls: AtomicU32::new(0),
            }
        }

        pub fn with_description(mut self, url: &str, text: &str) -> Self {
            self.descriptions.insert(url.into(), text.into());
            self
        }

        pub fn with_describe_delay(mut self, delay: Duration) -> Self {
            self.describe_delay = Some(delay);
            self
        }

        pub fn search_calls(&self) -> u32 {
            self.search_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearchProvider {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_search {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.results.clone())
        }

        async fn describe(&self, url: &str) -> Result<String> {
            if let Some(delay) = self.describe_delay {
                tokio::time::sleep(delay).await;
            }
            self.descriptions
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no description for {}", url))
        }
    }

    pub fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_search_response() -> serde_json::Value {
        serde_json::json!({
            "results": [
                { "url": "https://a.example", "title": "Alpha", "content": "first" },
                { "url": "https://b.example", "title": "Beta", "content": "second" },
                { "url": "https://c.example", "title": "Gamma" }
            ]
        })
    }

    #[tokio::test]
    async fn test_search_success_preserves_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("q", "weather today"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_search_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let results = provider.search("weather today").await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Alpha");
        assert_eq!(results[1].title, "Beta");
        assert_eq!(results[2].snippet, "", "missing content defaults to empty");
    }

    #[tokio::test]
    async fn test_search_empty_results_is_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })),
            )
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let results = provider.search("no matches anywhere").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let err = provider.search("query").await.unwrap_err().to_string();
        assert!(err.contains("502"), "error should mention status: {}", err);
    }

    #[tokio::test]
    async fn test_search_malformed_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let err = provider.search("query").await.unwrap_err().to_string();
        assert!(err.contains("parse"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_search_network_error() {
        let provider = RemoteSearchProvider::new("http://127.0.0.1:1/search".into());
        assert!(provider.search("query").await.is_err());
    }

    #[tokio::test]
    async fn test_describe_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("describe", "https://a.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "description": "a longer extracted description"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let description = provider.describe("https://a.example").await.unwrap();
        assert_eq!(description, "a longer extracted description");
    }

    #[tokio::test]
    async fn test_describe_empty_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "description": "  " })),
            )
            .mount(&server)
            .await;

        let provider = RemoteSearchProvider::new(format!("{}/search", server.uri()));
        let err = provider.describe("https://a.example").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}

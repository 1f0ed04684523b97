//! Prompt construction from the query and search context.

use std::collections::HashMap;

use crate::state::SearchResult;

/// Serializes search results into the context block of the prompt.
///
/// Results keep provider relevance order. A fetched description replaces the
/// provider snippet when available; URLs are included only when the selected
/// model profile asks for them.
pub fn format_search_context(
    results: &[SearchResult],
    descriptions: &HashMap<String, String>,
    include_urls: bool,
) -> String {
    let mut blocks = Vec::with_capacity(results.len());
    for result in results {
        let body = descriptions
            .get(&result.url)
            .map(String::as_str)
            .unwrap_or(result.snippet.as_str());
        if include_urls {
            blocks.push(format!("{}\n{}\n{}", result.title, result.url, body));
        } else {
            blocks.push(format!("{}\n{}", result.title, body));
        }
    }
    blocks.join("\n\n")
}

/// ChatML template shared by all current model profiles.
pub fn chatml_prompt(query: &str, search_context: &str) -> String {
    format!(
        "{search_context}<|im_end|>\n<|im_start|>user\n{query}<|im_end|>\n<|im_start|>assistant\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }

    #[test]
    fn test_context_without_urls() {
        let results = vec![
            result("https://a.example", "Alpha", "first snippet"),
            result("https://b.example", "Beta", "second snippet"),
        ];
        let context = format_search_context(&results, &HashMap::new(), false);
        assert_eq!(
            context,
            "Alpha\nfirst snippet\n\nBeta\nsecond snippet"
        );
        assert!(!context.contains("https://"));
    }

    #[test]
    fn test_context_with_urls() {
        let results = vec![result("https://a.example", "Alpha", "snippet")];
        let context = format_search_context(&results, &HashMap::new(), true);
        assert_eq!(context, "Alpha\nhttps://a.example\nsnippet");
    }

    #[test]
    fn test_description_overrides_snippet() {
        let results = vec![result("https://a.example", "Alpha", "short snippet")];
        let mut descriptions = HashMap::new();
        descriptions.insert(
            "https://a.example".to_string(),
            "a much richer description".to_string(),
        );
        let context = format_search_context(&results, &descriptions, false);
        assert_eq!(context, "Alpha\na much richer description");
    }

    #[test]
    fn test_empty_results_give_empty_context() {
        assert_eq!(format_search_context(&[], &HashMap::new(), false), "");
    }

    #[test]
    fn test_chatml_prompt_shape() {
        let prompt = chatml_prompt("weather today", "Alpha\ncontext");
        assert!(prompt.starts_with("Alpha\ncontext<|im_end|>"));
        assert!(prompt.contains("<|im_start|>user\nweather today<|im_end|>"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }
}

//! Web search through the Tavily API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::services::Capability;

/// Capability name the search is registered under.
pub const WEB_SEARCH: &str = "web_search";

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

/// One search hit as handed to roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct TavilySearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_results: u32,
}

impl TavilySearch {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, max_results: u32) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            max_results: max_results.max(1),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch")
            .field("endpoint", &self.endpoint)
            .field("max_results", &self.max_results)
            .finish()
    }
}

/// Pull the `query` string out of a capability input.
pub fn query_from_input(input: &Value) -> ServiceResult<&str> {
    input
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ServiceError::InvalidInput(format!("expected {{\"query\": <text>}}, got {input}")))
}

/// Render hits as the JSON list roles read, dropping hits without content.
pub fn render_hits(hits: Vec<SearchHit>) -> String {
    let kept: Vec<SearchHit> = hits.into_iter().filter(|h| !h.content.is_empty()).collect();
    serde_json::to_string(&kept).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl Capability for TavilySearch {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web. Input: {\"query\": search terms}"
    }

    #[instrument(skip_all, fields(capability = WEB_SEARCH))]
    async fn invoke(&self, input: &Value) -> ServiceResult<String> {
        let query = query_from_input(input)?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "max_results": self.max_results,
                "search_depth": "basic",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Capability {
                name: WEB_SEARCH.to_string(),
                reason: format!("search returned HTTP {}", response.status()),
            });
        }
        let body: SearchResponse = response.json().await?;
        debug!(hits = body.results.len(), "search complete");
        Ok(render_hits(body.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_must_be_non_empty_text() {
        assert_eq!(query_from_input(&json!({"query": "rust"})).unwrap(), "rust");
        assert!(matches!(
            query_from_input(&json!({"query": "  "})),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(query_from_input(&json!({"q": "rust"})).is_err());
    }

    #[test]
    fn test_render_drops_empty_hits() {
        let rendered = render_hits(vec![
            SearchHit { title: "Rust".into(), content: "A language".into() },
            SearchHit { title: "Empty".into(), content: String::new() },
        ]);
        assert_eq!(rendered, r#"[{"title":"Rust","content":"A language"}]"#);
    }

    #[test]
    fn test_response_tolerates_extra_fields() {
        let body: SearchResponse = serde_json::from_value(json!({
            "query": "rust",
            "results": [{"title": "Rust", "url": "https://rust-lang.org", "content": "c", "score": 0.9}]
        }))
        .unwrap();
        assert_eq!(body.results[0].title, "Rust");
    }

    #[test]
    fn test_debug_hides_key() {
        let search = TavilySearch::new(reqwest::Client::new(), "tvly-secret", 5);
        assert!(!format!("{search:?}").contains("tvly-secret"));
        assert_eq!(search.name(), "web_search");
    }
}

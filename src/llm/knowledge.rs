//! Knowledge base search exposed to the model as a tool.

use crate::error::GenerationError;
use serde::Deserialize;

/// Returned to the model when a search has no hits.
pub const NO_RESULTS: &str = "No relevant information found in the knowledge base.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeHit {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub content: KnowledgeContent,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KnowledgeContent {
    #[serde(default)]
    pub text: String,
    pub section: Option<String>,
    pub title: Option<String>,
}

/// Full-text search over support documentation.
#[async_trait::async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>, GenerationError>;
}

/// Render search hits as the tool result handed back to the model.
pub fn format_hits(hits: &[KnowledgeHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }

    let ranked: Vec<serde_json::Value> = hits
        .iter()
        .enumerate()
        .map(|(index, hit)| {
            serde_json::json!({
                "resourceId": hit.id,
                "rank": index + 1,
                "title": hit.content.title.as_deref().unwrap_or("Untitled"),
                "content": hit.content.text,
                "section": hit.content.section.as_deref().unwrap_or("unknown"),
                "score": hit.score,
            })
        })
        .collect();

    serde_json::Value::Array(ranked).to_string()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<KnowledgeHit>,
}

/// Upstash Search REST API.
#[derive(Debug, Clone)]
pub struct UpstashSearch {
    http: reqwest::Client,
    url: String,
    token: String,
    index: String,
}

impl UpstashSearch {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        token: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            index: index.into(),
        }
    }
}

#[async_trait::async_trait]
impl KnowledgeBase for UpstashSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>, GenerationError> {
        let endpoint = format!("{}/search/{}", self.url, self.index);
        let body = serde_json::json!({
            "query": query,
            "topK": limit,
            "reranking": true,
        });

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|error| GenerationError::Knowledge(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Knowledge(format!(
                "search returned {status}: {}",
                detail.trim()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Knowledge(format!("invalid search response: {error}")))?;

        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_results_are_spelled_out() {
        assert_eq!(format_hits(&[]), NO_RESULTS);
    }

    #[test]
    fn hits_are_ranked_with_fallback_labels() {
        let raw = r#"{"result": [
            {"id": "faq-1", "score": 0.92, "content": {"text": "Use /skin set", "section": "commands", "title": "Setting skins"}},
            {"id": "faq-2", "score": 0.41, "content": {"text": "Restart the proxy"}}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(raw).expect("search payload should decode");

        let formatted: serde_json::Value =
            serde_json::from_str(&format_hits(&response.result)).expect("formatted hits are JSON");

        assert_eq!(formatted[0]["rank"], 1);
        assert_eq!(formatted[0]["title"], "Setting skins");
        assert_eq!(formatted[1]["resourceId"], "faq-2");
        assert_eq!(formatted[1]["title"], "Untitled");
        assert_eq!(formatted[1]["section"], "unknown");
    }
}

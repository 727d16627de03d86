//! search_web_medical：通过 SerpAPI 检索最新医学信息（临床试验、FDA 审批、指南更新、疫情）
//!
//! 查询词自动追加 " medical"；只取前 num_results 条 organic_results。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::config::SearchSection;
use crate::core::AgentError;
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
struct WebSearchArgs {
    /// Search query for current medical information
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    num_results: usize,
}

impl WebSearchTool {
    pub fn new(cfg: &SearchSection, api_key: Option<String>) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| AgentError::Initialization(format!("Web search HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key,
            num_results: cfg.num_results,
        })
    }

    async fn search(&self, query: &str) -> Result<SerpResponse, String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "Web search error: SERPAPI_KEY is not configured".to_string())?;
        let q = format!("{} medical", query);
        let num = self.num_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", q.as_str()),
                ("api_key", api_key),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Web search error: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Web search error: HTTP {}", resp.status()));
        }
        resp.json::<SerpResponse>()
            .await
            .map_err(|e| format!("Web search error: {}", e))
    }
}

fn format_results(resp: &SerpResponse, limit: usize) -> String {
    if resp.organic_results.is_empty() {
        return "No web results found".to_string();
    }
    let mut lines = vec!["WEB SEARCH RESULTS:\n".to_string()];
    for (i, r) in resp.organic_results.iter().take(limit).enumerate() {
        lines.push(format!(
            "{}. **{}**\n   {}\n   Link: {}\n",
            i + 1,
            r.title.as_deref().unwrap_or("No title"),
            r.snippet.as_deref().unwrap_or("No description"),
            r.link.as_deref().unwrap_or("")
        ));
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search_web_medical"
    }

    fn description(&self) -> &str {
        "Search the web for current medical information: latest clinical trials, \
         FDA approvals, updated guidelines, outbreak information, breaking medical news. \
         Returns titles, snippets and URLs."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WebSearchArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {}", e))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "web search");
        let resp = self.search(query).await?;
        if let Some(err) = resp.error.as_deref().filter(|_| resp.organic_results.is_empty()) {
            // SerpAPI 在无结果时也会返回 error 字段
            tracing::warn!(error = %err, "web search returned no results");
        }
        Ok(format_results(&resp, self.num_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results_limits_and_defaults() {
        let resp: SerpResponse = serde_json::from_value(serde_json::json!({
            "organic_results": [
                {"title": "FDA approves new RSV vaccine", "snippet": "The agency...", "link": "https://fda.gov/a"},
                {"snippet": "no title here"},
                {"title": "third", "snippet": "s", "link": "l"}
            ]
        }))
        .unwrap();
        let out = format_results(&resp, 2);
        assert!(out.starts_with("WEB SEARCH RESULTS:\n"));
        assert!(out.contains("1. **FDA approves new RSV vaccine**\n   The agency...\n   Link: https://fda.gov/a"));
        assert!(out.contains("2. **No title**\n   no title here"));
        assert!(!out.contains("third"));
    }

    #[test]
    fn test_format_no_results() {
        assert_eq!(format_results(&SerpResponse::default(), 5), "No web results found");
    }

    #[test]
    fn test_new_applies_search_config() {
        let cfg = SearchSection {
            endpoint: "http://127.0.0.1:9/search.json".to_string(),
            num_results: 3,
            timeout_secs: 2,
        };
        let tool = WebSearchTool::new(&cfg, Some("k".to_string())).unwrap();
        assert_eq!(tool.endpoint, "http://127.0.0.1:9/search.json");
        assert_eq!(tool.num_results, 3);
    }

    #[tokio::test]
    async fn test_missing_key_is_reported() {
        let tool = WebSearchTool::new(&SearchSection::default(), None).unwrap();
        let err = tool
            .execute(serde_json::json!({"query": "measles outbreak"}))
            .await
            .unwrap_err();
        assert!(err.contains("SERPAPI_KEY"));
    }
}

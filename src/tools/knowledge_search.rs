//! search_medical_knowledge：检索医学知识库（教材、指南等向量化文档）

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::services::{KnowledgeBaseService, KnowledgeHit};
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
struct KnowledgeSearchArgs {
    /// Medical question or topic to search for
    query: String,
}

pub struct KnowledgeSearchTool {
    service: Arc<KnowledgeBaseService>,
}

impl KnowledgeSearchTool {
    pub fn new(service: Arc<KnowledgeBaseService>) -> Self {
        Self { service }
    }
}

/// "Found N results" + 编号结果（相关度两位小数、来源、正文），以 --- 分隔
pub fn format_hits(hits: &[KnowledgeHit]) -> String {
    if hits.is_empty() {
        return "No relevant information found in knowledge base".to_string();
    }
    let parts: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "Result {} (Relevance: {:.2})\nSource: {}\n{}\n",
                i + 1,
                h.score,
                h.source,
                h.text
            )
        })
        .collect();
    format!("Found {} results\n\n{}", hits.len(), parts.join("\n---\n\n"))
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_medical_knowledge"
    }

    fn description(&self) -> &str {
        "Search the medical knowledge base for clinical information: definitions, \
         pathophysiology, treatment protocols, clinical guidelines, drug information. \
         Returns relevant medical literature with relevance scores and sources."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<KnowledgeSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: KnowledgeSearchArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {}", e))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "knowledge search");
        let hits = self
            .service
            .search(query, None)
            .await
            .map_err(|e| format!("Search error: {}", e))?;
        Ok(format_hits(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn hit(score: f32, source: &str, text: &str) -> KnowledgeHit {
        KnowledgeHit {
            score,
            text: text.into(),
            source: source.into(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(format_hits(&[]), "No relevant information found in knowledge base");
    }

    #[test]
    fn test_format_numbered_results() {
        let out = format_hits(&[
            hit(0.876, "Harrison.pdf", "Asthma is a chronic inflammatory disorder."),
            hit(0.5, "unknown", ""),
        ]);
        assert!(out.starts_with("Found 2 results\n\n"));
        assert!(out.contains("Result 1 (Relevance: 0.88)\nSource: Harrison.pdf\nAsthma"));
        assert!(out.contains("\n---\n\nResult 2 (Relevance: 0.50)"));
    }
}

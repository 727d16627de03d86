//! 知识库服务：查询嵌入 + 向量库相似检索
//!
//! 向量库与嵌入模型都是外部预言机：这里只负责编码查询、调用 query、把 metadata 展平为检索结果。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::config::KnowledgeSection;
use crate::core::AgentError;
use crate::llm::EmbeddingProvider;

const PINECONE_API_VERSION: &str = "2024-07";

/// 向量库返回的单条匹配
#[derive(Debug, Clone, Deserialize)]
pub struct VectorMatch {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 相似检索预言机
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<VectorMatch>, String>;
}

/// Pinecone 数据面 REST 客户端；索引 host 首次查询时通过 describe-index 解析并缓存
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    index_name: String,
    control_plane_url: String,
    host: OnceCell<String>,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

impl PineconeIndex {
    pub fn new(cfg: &KnowledgeSection, api_key: &str) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| AgentError::Initialization(format!("Knowledge base client: {}", e)))?;
        let host = OnceCell::new();
        if let Some(h) = cfg.index_host.as_deref().filter(|h| !h.is_empty()) {
            let _ = host.set(normalize_host(h));
        }
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            index_name: cfg.index_name.clone(),
            control_plane_url: cfg.control_plane_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    async fn host(&self) -> Result<&str, String> {
        self.host
            .get_or_try_init(|| async {
                let url = format!("{}/indexes/{}", self.control_plane_url, self.index_name);
                let resp = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
                    .send()
                    .await
                    .map_err(|e| format!("Describe index failed: {}", e))?;
                if !resp.status().is_success() {
                    return Err(format!("Describe index HTTP {}", resp.status()));
                }
                let desc: DescribeIndexResponse = resp
                    .json()
                    .await
                    .map_err(|e| format!("Invalid describe-index response: {}", e))?;
                tracing::info!(index = %self.index_name, host = %desc.host, "resolved index host");
                Ok::<String, String>(normalize_host(&desc.host))
            })
            .await
            .map(String::as_str)
    }
}

/// host 可能不带 scheme（describe-index 返回裸域名）
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<VectorMatch>, String> {
        let host = self.host().await?;
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        let resp = self
            .client
            .post(format!("{}/query", host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Query failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Query HTTP {}", resp.status()));
        }
        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| format!("Invalid query response: {}", e))?;
        Ok(parsed.matches)
    }
}

/// 格式化后的检索结果
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub score: f32,
    pub text: String,
    pub source: String,
    pub metadata: Map<String, Value>,
}

impl From<VectorMatch> for KnowledgeHit {
    fn from(m: VectorMatch) -> Self {
        let text = m
            .metadata
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let source = m
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Self {
            score: m.score,
            text,
            source,
            metadata: m.metadata,
        }
    }
}

/// 知识库服务：持有嵌入提供方与向量索引
pub struct KnowledgeBaseService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
}

impl KnowledgeBaseService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        default_top_k: usize,
    ) -> Self {
        tracing::info!(top_k = default_top_k, "knowledge base service initialized");
        Self {
            embedder,
            index,
            default_top_k,
        }
    }

    /// 检索；top_k 为 None 或 0 时使用配置默认值
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<KnowledgeHit>, AgentError> {
        let top_k = top_k.filter(|k| *k > 0).unwrap_or(self.default_top_k);
        let vector = self.embedder.embed(query).await.map_err(|e| {
            tracing::error!(error = %e, "embedding generation failed");
            AgentError::ToolExecutionFailed(format!("Embedding failed: {}", e))
        })?;
        let matches = self.index.query(vector, top_k).await.map_err(|e| {
            tracing::error!(error = %e, "knowledge base search failed");
            AgentError::ToolExecutionFailed(format!("Search failed: {}", e))
        })?;
        let hits: Vec<KnowledgeHit> = matches.into_iter().map(KnowledgeHit::from).collect();
        tracing::info!(count = hits.len(), "knowledge base results");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        seen_top_k: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<VectorMatch>, String> {
            assert_eq!(vector.len(), 3);
            self.seen_top_k.lock().unwrap().push(top_k);
            let mut with_meta = Map::new();
            with_meta.insert("text".into(), Value::String("Insulin resistance...".into()));
            with_meta.insert("source".into(), Value::String("Harrison.pdf".into()));
            Ok(vec![
                VectorMatch { id: "a".into(), score: 0.91, metadata: with_meta },
                VectorMatch { id: "b".into(), score: 0.5, metadata: Map::new() },
            ])
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn query(&self, _vector: Vec<f32>, _top_k: usize) -> Result<Vec<VectorMatch>, String> {
            Err("503 Service Unavailable".into())
        }
    }

    #[tokio::test]
    async fn test_search_flattens_metadata_with_defaults() {
        let index = Arc::new(RecordingIndex::default());
        let service = KnowledgeBaseService::new(Arc::new(FixedEmbedder), index.clone(), 10);
        let hits = service.search("type 2 diabetes", None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "Harrison.pdf");
        assert_eq!(hits[0].text, "Insulin resistance...");
        assert_eq!(hits[1].source, "unknown");
        assert_eq!(hits[1].text, "");
        assert_eq!(*index.seen_top_k.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_search_honours_explicit_top_k() {
        let index = Arc::new(RecordingIndex::default());
        let service = KnowledgeBaseService::new(Arc::new(FixedEmbedder), index.clone(), 10);
        service.search("q", Some(3)).await.unwrap();
        service.search("q", Some(0)).await.unwrap();
        assert_eq!(*index.seen_top_k.lock().unwrap(), vec![3, 10]);
    }

    #[tokio::test]
    async fn test_search_error_maps_to_tool_failure() {
        let service = KnowledgeBaseService::new(Arc::new(FixedEmbedder), Arc::new(FailingIndex), 10);
        let err = service.search("q", None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(ref m) if m.contains("503")));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("idx.svc.pinecone.io"), "https://idx.svc.pinecone.io");
        assert_eq!(normalize_host("https://idx.svc.pinecone.io/"), "https://idx.svc.pinecone.io");
    }
}

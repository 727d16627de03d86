//! 嵌入 API：供知识库检索把查询编码为向量
//!
//! - openai: 调用 OpenAI 兼容的 /embeddings 端点（如 text-embeddings-inference 部署的 all-MiniLM-L6-v2）
//! - local:  fastembed 本地推理（feature `local-embeddings`）

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::EmbeddingSection;
use crate::core::AgentError;

/// 嵌入提供方：将文本编码为向量；失败时返回错误字符串
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("Cannot embed empty text".to_string());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| "Embedding response contained no vectors".to_string())
    }
}

/// fastembed 本地模型（all-MiniLM-L6-v2，384 维，与索引构建时一致）
#[cfg(feature = "local-embeddings")]
pub struct FastEmbedder {
    model: Arc<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings")]
impl FastEmbedder {
    pub fn new() -> Result<Self, String> {
        let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
            fastembed::EmbeddingModel::AllMiniLML6V2,
        ))
        .map_err(|e| format!("fastembed init failed: {}", e))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let model = self.model.clone();
        let text = text.to_string();
        // 推理为 CPU 密集，放到阻塞线程池
        tokio::task::spawn_blocking(move || model.embed(vec![text], None))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?
            .into_iter()
            .next()
            .ok_or_else(|| "fastembed returned no vectors".to_string())
    }
}

/// 按 [knowledge.embedding] 创建嵌入提供方
pub fn create_embedder_from_config(
    cfg: &EmbeddingSection,
) -> Result<Arc<dyn EmbeddingProvider>, AgentError> {
    match cfg.provider.to_lowercase().as_str() {
        "openai" => {
            let key = std::env::var("EMBEDDING_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            tracing::info!(model = %cfg.model, "using OpenAI-compatible embeddings");
            Ok(Arc::new(OpenAiEmbedder::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                key.as_deref(),
            )))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => {
            tracing::info!("using local fastembed embeddings (all-MiniLM-L6-v2)");
            Ok(Arc::new(FastEmbedder::new().map_err(AgentError::Initialization)?))
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(AgentError::Initialization(
            "embedding provider 'local' requires the local-embeddings feature".to_string(),
        )),
        other => Err(AgentError::ConfigError(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

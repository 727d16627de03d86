//! 医学问答 Agent
//!
//! MedicalAgent 串起整条查询路径：Guard 过滤 → 组装 system prompt（对话上下文 + 影像状态 + 工具目录）
//! → ReAct 循环 → 写入对话记忆。TUI 编排器与 medassist-ask 都只通过这里访问 Agent。
//! build_agent 按 AppConfig + Secrets 装配 LLM、视觉、知识库、网页检索与工具。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, Secrets};
use crate::core::{AgentError, ImageMetadata, QueryResult, RecoveryEngine};
use crate::llm::{
    create_embedder_from_config, create_gemini_client, LlmClient, MockLlmClient, VisionClient,
};
use crate::memory::{ConversationMemory, ExportedMessage, Message};
use crate::react::{build_system_prompt, Planner, ReactEvent, ReactSession};
use crate::services::{
    GuardService, ImageHandler, ImageLoader, ImageSource, KnowledgeBaseService, PineconeIndex,
    SharedImageHandler,
};
use crate::tools::{
    ImageAnalysisTool, KnowledgeSearchTool, MedicalCalculatorTool, ToolExecutor, ToolRegistry,
    WebSearchTool,
};

/// 单次查询的可选参数
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// 跳过 Guard（如用户确认后重试）
    pub skip_guard: bool,
    /// ReAct 过程事件
    pub event_tx: Option<UnboundedSender<ReactEvent>>,
    pub cancel_token: Option<CancellationToken>,
}

/// Agent 统计（侧边栏展示）
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStatistics {
    pub memory_summary: String,
    pub total_messages: usize,
    pub has_pending_image: bool,
    /// 累计 token（prompt + completion）
    pub total_tokens: u64,
}

pub struct MedicalAgent {
    planner: Planner,
    executor: ToolExecutor,
    recovery: RecoveryEngine,
    guard: Option<GuardService>,
    memory: ConversationMemory,
    images: SharedImageHandler,
    image_loader: ImageLoader,
    max_iterations: usize,
    context_turns: usize,
}

impl MedicalAgent {
    /// 由已注册的工具构造；llm 同时用于规划与 Guard 分类
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        images: SharedImageHandler,
        cfg: &AppConfig,
    ) -> Result<Self, AgentError> {
        let guard = cfg
            .agent
            .enable_guard
            .then(|| GuardService::new(llm.clone(), &cfg.guard));
        let executor = ToolExecutor::new(tools, cfg.agent.tool_timeout_secs);
        tracing::info!(
            tools = ?executor.tool_names(),
            guard = guard.is_some(),
            max_iterations = cfg.agent.max_iterations,
            "medical agent initialized"
        );
        Ok(Self {
            planner: Planner::new(llm),
            executor,
            recovery: RecoveryEngine::new(),
            guard,
            memory: ConversationMemory::new(cfg.agent.max_memory_turns),
            images,
            image_loader: ImageLoader::new(&cfg.image)?,
            max_iterations: cfg.agent.max_iterations,
            context_turns: cfg.agent.context_turns,
        })
    }

    pub async fn query(&mut self, question: &str) -> QueryResult {
        self.query_with(question, QueryOptions::default()).await
    }

    pub async fn query_with(&mut self, question: &str, opts: QueryOptions) -> QueryResult {
        let question = question.trim();
        let preview: String = question.chars().take(50).collect();
        tracing::info!(query = %preview, "processing query");

        let cancel_token = opts.cancel_token.unwrap_or_default();

        if !opts.skip_guard {
            if let Some(guard) = &self.guard {
                let verdict = tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("query cancelled during guard check");
                        return cancelled_result();
                    }
                    v = guard.is_medical_query(question) => v,
                };
                if !verdict.admitted {
                    tracing::warn!(reason = %verdict.reason, "query rejected");
                    return QueryResult::rejected(
                        guard.rejection_message(&verdict.reason),
                        verdict.reason,
                    );
                }
                tracing::debug!(reason = %verdict.reason, "query admitted");
            }
        }

        let conversation_context = self.memory.get_recent_context(self.context_turns);
        let image_context = self.images.lock().await.image_context();
        let system = build_system_prompt(
            &self.executor.catalogue(),
            &conversation_context,
            &image_context,
        );

        let mut session = ReactSession::new(
            &self.planner,
            &self.executor,
            &self.recovery,
            cancel_token,
        )
        .with_max_iterations(self.max_iterations);
        if let Some(tx) = opts.event_tx.as_ref() {
            session = session.with_event_tx(tx);
        }

        match session.run(&system, question).await {
            Ok(outcome) => {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                let mut tools_used: Vec<String> = Vec::new();
                for tool in &outcome.tools_used {
                    *counts.entry(tool.clone()).or_default() += 1;
                    if !tools_used.contains(tool) {
                        tools_used.push(tool.clone());
                    }
                }
                self.memory
                    .add_exchange(question, outcome.response.clone(), tools_used.clone());
                tracing::info!(tools = ?tools_used, steps = outcome.steps, "query processed");

                let mut metadata = serde_json::Map::new();
                metadata.insert("steps".to_string(), Value::from(outcome.steps));
                if outcome.hit_limit {
                    metadata.insert("hit_iteration_limit".to_string(), Value::Bool(true));
                }
                QueryResult {
                    response: outcome.response,
                    success: true,
                    rejected: false,
                    rejection_reason: None,
                    tools_used,
                    tool_call_counts: counts,
                    metadata,
                }
            }
            Err(AgentError::Cancelled) => {
                tracing::info!("query cancelled");
                cancelled_result()
            }
            Err(e) => {
                let response = format!("Error processing query: {}", e);
                tracing::error!(error = %e, "query failed");
                self.memory.add_exchange(question, response.clone(), Vec::new());
                QueryResult::failed(response, &e.to_string())
            }
        }
    }

    /// 加载并登记影像（设为 pending）；filename 为空时从来源推断
    pub async fn upload_image(
        &self,
        source: ImageSource,
        filename: Option<&str>,
    ) -> Result<ImageMetadata, AgentError> {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .unwrap_or_else(|| source.default_filename());
        let loaded = self.image_loader.load(source).await?;
        Ok(self.images.lock().await.store_image(loaded, &filename))
    }

    pub fn conversation_history(&self) -> &[Message] {
        self.memory.messages()
    }

    pub fn export_history(&self) -> Vec<ExportedMessage> {
        self.memory.export_history()
    }

    pub fn clear_conversation(&mut self) {
        self.memory.clear();
        tracing::info!("conversation cleared");
    }

    /// 清除全部已上传影像（含 pending）
    pub async fn clear_images(&self) {
        self.images.lock().await.clear_all();
    }

    pub async fn statistics(&self) -> AgentStatistics {
        AgentStatistics {
            memory_summary: self.memory.summary(),
            total_messages: self.memory.len(),
            has_pending_image: self.images.lock().await.has_pending(),
            total_tokens: self.planner.token_usage().2,
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }

    /// Guard 只做关键词与动词匹配（Mock 模式下回显模型无法分类）
    pub fn without_guard_classifier(mut self) -> Self {
        self.guard = self.guard.map(GuardService::without_classifier);
        self
    }
}

/// 取消的查询不写入记忆，metadata.cancelled = true
fn cancelled_result() -> QueryResult {
    let mut result = QueryResult::failed("Query cancelled.".to_string(), "Cancelled");
    result
        .metadata
        .insert("cancelled".to_string(), Value::Bool(true));
    result
}

/// 按配置装配完整 Agent
///
/// 缺少 GOOGLE_API_KEY 时退回 MockLlmClient（仅回显，便于离线试用界面），Guard 不做模型分类；
/// 缺少 PINECONE_API_KEY 时不注册知识库工具；网页检索在调用时报告缺失的 SERPAPI_KEY。
pub fn build_agent(cfg: &AppConfig, secrets: &Secrets) -> Result<MedicalAgent, AgentError> {
    let missing = secrets.missing();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "some API keys are not configured");
    }

    let llm: Arc<dyn LlmClient>;
    let vision: Arc<dyn VisionClient>;
    let model_label: String;
    let offline = secrets.google_api_key.is_none();
    match secrets.google_api_key.as_deref() {
        Some(key) => {
            let client = Arc::new(create_gemini_client(&cfg.llm, Some(key)));
            llm = client.clone();
            vision = client;
            model_label = cfg.llm.model.clone();
        }
        None => {
            tracing::warn!("GOOGLE_API_KEY not set, using mock LLM");
            let mock = Arc::new(MockLlmClient::new());
            llm = mock.clone();
            vision = mock;
            model_label = "mock".to_string();
        }
    }

    let images = ImageHandler::shared();
    let mut tools = ToolRegistry::new();

    match secrets.pinecone_api_key.as_deref() {
        Some(key) => {
            let embedder = create_embedder_from_config(&cfg.knowledge.embedding)?;
            let index = Arc::new(PineconeIndex::new(&cfg.knowledge, key)?);
            let service = Arc::new(KnowledgeBaseService::new(
                embedder,
                index,
                cfg.knowledge.top_k,
            ));
            tools.register(KnowledgeSearchTool::new(service));
        }
        None => tracing::warn!("PINECONE_API_KEY not set, knowledge base search disabled"),
    }
    tools.register(WebSearchTool::new(&cfg.search, secrets.serpapi_key.clone())?);
    tools.register(ImageAnalysisTool::new(
        images.clone(),
        vision,
        model_label,
        cfg.image.max_dimension,
    ));
    tools.register(MedicalCalculatorTool::new());

    let agent = MedicalAgent::new(llm, tools, images, cfg)?;
    if offline {
        Ok(agent.without_guard_classifier())
    } else {
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    /// 分类调用很慢的模型
    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok("YES - medical".to_string())
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_guard_classification() {
        let mut agent = MedicalAgent::new(
            Arc::new(SlowLlm),
            ToolRegistry::new(),
            ImageHandler::shared(),
            &AppConfig::default(),
        )
        .unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = agent
            .query_with(
                "Will it rain tomorrow?",
                QueryOptions {
                    cancel_token: Some(token),
                    ..Default::default()
                },
            )
            .await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!result.success);
        assert_eq!(result.metadata["cancelled"], Value::Bool(true));
        assert!(agent.conversation_history().is_empty());
    }

    #[tokio::test]
    async fn test_offline_guard_does_not_classify_with_echo_model() {
        let mut agent = build_agent(&AppConfig::default(), &Secrets::default()).unwrap();
        let result = agent.query("Will it rain tomorrow?").await;
        assert!(!result.rejected);
        assert!(result.success);
        assert_eq!(result.response, "Echo from Mock: Will it rain tomorrow?");
    }

    #[tokio::test]
    async fn test_build_agent_without_keys_uses_mock() {
        let cfg = AppConfig::default();
        let mut agent = build_agent(&cfg, &Secrets::default()).unwrap();
        assert_eq!(
            agent.tool_names(),
            vec![
                "analyze_medical_image",
                "calculate_medical_metric",
                "search_web_medical"
            ]
        );
        let result = agent.query("What are the symptoms of flu?").await;
        assert!(result.success);
        assert_eq!(result.response, "Echo from Mock: What are the symptoms of flu?");
        assert_eq!(agent.conversation_history().len(), 2);
    }

    #[tokio::test]
    async fn test_statistics() {
        let agent = build_agent(&AppConfig::default(), &Secrets::default()).unwrap();
        let stats = agent.statistics().await;
        assert_eq!(stats.memory_summary, "No conversation history");
        assert_eq!(stats.total_messages, 0);
        assert!(!stats.has_pending_image);
        assert_eq!(stats.total_tokens, 0);
    }
}

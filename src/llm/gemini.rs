//! Gemini 客户端（OpenAI 兼容格式）
//!
//! Gemini 提供 OpenAI 兼容的 chat/completions 接口，文本规划与影像分析均走此端点。
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai/
//! - 默认模型: gemini-2.5-flash-lite

use std::time::Duration;

use crate::config::LlmSection;
use crate::llm::{OpenAiClient, Sampling};

/// 创建 Gemini 客户端（同时实现 LlmClient 与 VisionClient）
///
/// - 优先使用传入的 api_key，否则读取环境变量 `GOOGLE_API_KEY`
/// - base_url / model / 采样参数来自 [llm] 段
pub fn create_gemini_client(cfg: &LlmSection, api_key: Option<&str>) -> OpenAiClient {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    OpenAiClient::new(Some(cfg.base_url()), &cfg.model, Some(api_key.as_str())).with_sampling(
        Sampling {
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
        },
    )
    .with_timeout(Duration::from_secs(cfg.request_timeout_secs))
}


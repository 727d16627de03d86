//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini / Mock）实现 LlmClient：complete（非流式，返回首条回复文本）。

use async_trait::async_trait;

use crate::memory::Message;

/// 请求超时的错误前缀；Planner 据此映射为可重试的 NetworkTimeout
pub const TIMEOUT_PREFIX: &str = "request timed out";

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    /// 单条 user prompt 的便捷调用（Guard 分类等）
    async fn generate_text(&self, prompt: &str) -> Result<String, String> {
        self.complete(&[Message::user(prompt)]).await
    }
}

//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 ReAct 循环决定是重试还是终止本次查询。
//! 工具失败不经过这里：循环直接把错误写成 Observation 继续。

use crate::core::{AgentError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// available_tools 用于在「幻觉工具」时提示模型可选的工具名
    pub fn handle(&self, err: &AgentError, available_tools: &[String]) -> RecoveryAction {
        match err {
            AgentError::JsonParseError(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous tool call was not valid JSON: {raw}. \
                 To call a tool, output exactly one JSON object and nothing else, \
                 in the form {{\"tool\": \"<name>\", \"args\": {{...}}}}. \
                 Example: {{\"tool\": \"search_medical_knowledge\", \"args\": {{\"query\": \"asthma treatment\"}}}}. \
                 Otherwise reply with the final answer as plain text."
            )),
            AgentError::HallucinatedTool(name) => RecoveryAction::RetryWithPrompt(format!(
                "{name} is not a valid tool, try one of [{}].",
                available_tools.join(", ")
            )),
            AgentError::NetworkTimeout => RecoveryAction::RetryWithPrompt(
                "The previous request timed out. Please continue.".to_string(),
            ),
            AgentError::LlmError(_) | AgentError::Cancelled => RecoveryAction::Abort,
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_json_parse_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::JsonParseError("invalid json".to_string());
        match engine.handle(&err, &[]) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("JSON"));
                assert!(msg.contains("invalid json"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_hallucinated_tool_lists_valid_tools() {
        let engine = RecoveryEngine::new();
        let err = AgentError::HallucinatedTool("order_labs".to_string());
        let tools = vec!["search_medical_knowledge".to_string(), "search_web_medical".to_string()];
        match engine.handle(&err, &tools) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("order_labs"));
                assert!(msg.contains("search_medical_knowledge, search_web_medical"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_llm_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LlmError("429 Too Many Requests".to_string());
        assert!(matches!(engine.handle(&err, &[]), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert!(matches!(engine.handle(&AgentError::Cancelled, &[]), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_network_timeout() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::NetworkTimeout, &[]);
        assert!(matches!(action, RecoveryAction::RetryWithPrompt(_)));
    }
}

//! Planner：调用 LLM 并把输出解析为 Tool Call 或最终回答
//!
//! 约定格式：单个 JSON 对象 `{"tool": "<name>", "args": {...}}`（允许包在 ```json 代码块中），
//! 其余纯文本一律视为最终回答。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{LlmClient, TIMEOUT_PREFIX};
use crate::memory::Message;

/// LLM 返回的 Tool Call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Planner 输出
#[derive(Debug, Clone)]
pub enum PlannerOutput {
    /// 最终回答
    Response(String),
    ToolCall(ToolCall),
}

/// 解析 LLM 输出
///
/// 含 ```json 代码块，或 `{...}` 块中带 `"tool":` 键时按 Tool Call 解析（失败返回 JsonParseError 以便重试）；
/// 否则为最终回答（包括正文里出现带引号的 "tool" 一词）。tool 为空串也视为最终回答。
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end && has_tool_key(&trimmed[start..=end]) => {
                &trimmed[start..=end]
            }
            _ => return Ok(PlannerOutput::Response(trimmed.to_string())),
        }
    };

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    if parsed.tool.trim().is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// `"tool"` 是否以对象键的形式出现（其后紧跟冒号）
fn has_tool_key(block: &str) -> bool {
    block
        .match_indices("\"tool\"")
        .any(|(i, m)| block[i + m.len()..].trim_start().starts_with(':'))
}

/// Planner：持有 LLM，每轮把 system + scratchpad 拼好后调用
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan_with_system(
        &self,
        messages: &[Message],
        system: &str,
    ) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(system));
        full_messages.extend_from_slice(messages);
        self.llm
            .complete(&full_messages)
            .await
            .map_err(|e| {
                if e.starts_with(TIMEOUT_PREFIX) {
                    AgentError::NetworkTimeout
                } else {
                    AgentError::LlmError(e)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_answer() {
        match parse_llm_output("  Asthma is a chronic airway disease.  ").unwrap() {
            PlannerOutput::Response(r) => assert_eq!(r, "Asthma is a chronic airway disease."),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn test_answer_with_braces_is_not_a_tool_call() {
        let out = parse_llm_output("Normal range is {3.5-5.0} mmol/L").unwrap();
        assert!(matches!(out, PlannerOutput::Response(_)));
    }

    #[test]
    fn test_parse_bare_json_tool_call() {
        let out = parse_llm_output(
            r#"I will search. {"tool": "search_medical_knowledge", "args": {"query": "asthma"}}"#,
        )
        .unwrap();
        match out {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "search_medical_knowledge");
                assert_eq!(tc.args["query"], "asthma");
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn test_parse_fenced_json_and_default_args() {
        let out = parse_llm_output("```json\n{\"tool\": \"analyze_medical_image\"}\n```").unwrap();
        match out {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "analyze_medical_image");
                assert!(tc.args.as_object().unwrap().is_empty());
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn test_malformed_tool_call_is_parse_error() {
        let err = parse_llm_output(r#"{"tool": "search_web_medical", "args": {"query": }"#).unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
    }

    #[test]
    fn test_quoted_tool_word_in_prose_is_response() {
        let answer = r#"A spacer is a "tool" that improves inhaler delivery."#;
        match parse_llm_output(answer).unwrap() {
            PlannerOutput::Response(text) => assert_eq!(text, answer),
            other => panic!("expected response, got {other:?}"),
        }
        let braced = r#"Use the "tool" called a peak flow meter; target {80-100}% of personal best."#;
        assert!(matches!(parse_llm_output(braced).unwrap(), PlannerOutput::Response(_)));
    }

    #[test]
    fn test_tool_call_after_prose() {
        let out = parse_llm_output(
            r#"Let me look that up. {"tool": "search_web_medical", "args": {"query": "RSV vaccine"}}"#,
        )
        .unwrap();
        match out {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "search_web_medical");
                assert_eq!(tc.args["query"], "RSV vaccine");
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn test_empty_tool_name_is_response() {
        let out = parse_llm_output(r#"{"tool": "", "args": {}}"#).unwrap();
        assert!(matches!(out, PlannerOutput::Response(_)));
    }
}

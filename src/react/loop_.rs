//! ReAct 主循环
//!
//! Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出最终回答或达到步数上限。
//! 工具调用与观察只写入本次查询的 scratchpad，不进入对话记忆。
//! 工具失败 / 超时写成 "Error: ..." 观察继续；JSON 错误与不存在的工具交给 RecoveryEngine 重试；
//! LLM 错误终止本次查询。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::Message;
use crate::react::{parse_llm_output, Planner, PlannerOutput, ReactEvent};
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 一次查询的循环结果
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    pub response: String,
    /// 按调用顺序记录（可重复），仅含实际派发的已注册工具
    pub tools_used: Vec<String>,
    /// 实际发生的 LLM 调用次数
    pub steps: usize,
    pub hit_limit: bool,
}

/// ReAct 会话配置：必需组件 + 可选事件通道
pub struct ReactSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    pub cancel_token: CancellationToken,
    pub max_iterations: usize,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> ReactSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            cancel_token,
            max_iterations: 15,
            event_tx: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 对单个问题执行 ReAct 循环；system 为已组装好的 system prompt
    pub async fn run(&self, system: &str, user_input: &str) -> Result<ReactOutcome, AgentError> {
        let mut scratchpad = vec![Message::user(user_input)];
        let mut tools_used = Vec::new();
        let mut last_output = String::new();
        let mut step = 0;

        loop {
            if self.cancel_token.is_cancelled() {
                self.send_event(ReactEvent::Error {
                    text: "Cancelled by user".to_string(),
                });
                return Err(AgentError::Cancelled);
            }

            if step >= self.max_iterations {
                tracing::warn!(max_iterations = self.max_iterations, "iteration limit reached");
                let mut response = format!(
                    "Agent stopped after reaching the iteration limit ({} steps).",
                    self.max_iterations
                );
                if !last_output.trim().is_empty() {
                    response.push_str("\n\nLast output:\n");
                    response.push_str(last_output.trim());
                }
                return Ok(ReactOutcome {
                    response,
                    tools_used,
                    steps: step,
                    hit_limit: true,
                });
            }

            step += 1;
            self.send_event(ReactEvent::StepUpdate {
                step,
                max_steps: self.max_iterations,
            });
            self.send_event(ReactEvent::Thinking);

            let planned = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    self.send_event(ReactEvent::Error { text: "Cancelled by user".to_string() });
                    return Err(AgentError::Cancelled);
                }
                r = self.planner.plan_with_system(&scratchpad, system) => r,
            };
            let output = match planned {
                Ok(o) => o,
                Err(e) => match self.recovery.handle(&e, &self.executor.tool_names()) {
                    RecoveryAction::RetryWithPrompt(prompt) => {
                        self.send_event(ReactEvent::Recovery {
                            action: "RetryWithPrompt".to_string(),
                            detail: prompt.clone(),
                        });
                        scratchpad.push(Message::user(prompt));
                        continue;
                    }
                    RecoveryAction::Abort => {
                        tracing::error!(error = %e, step, "llm call failed");
                        self.send_event(ReactEvent::Recovery {
                            action: "Abort".to_string(),
                            detail: e.to_string(),
                        });
                        self.send_event(ReactEvent::Error { text: e.to_string() });
                        return Err(e);
                    }
                },
            };
            last_output = output.clone();

            let call = match parse_llm_output(&output) {
                Ok(PlannerOutput::Response(resp)) => {
                    tracing::info!(steps = step, tools = tools_used.len(), "final answer");
                    return Ok(ReactOutcome {
                        response: resp,
                        tools_used,
                        steps: step,
                        hit_limit: false,
                    });
                }
                Ok(PlannerOutput::ToolCall(tc)) if self.executor.has_tool(&tc.tool) => tc,
                Ok(PlannerOutput::ToolCall(tc)) => {
                    tracing::warn!(tool = %tc.tool, "model requested unknown tool");
                    self.retry_or_abort(
                        AgentError::HallucinatedTool(tc.tool),
                        &output,
                        &mut scratchpad,
                    )?;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable tool call");
                    self.retry_or_abort(e, &output, &mut scratchpad)?;
                    continue;
                }
            };

            self.send_event(ReactEvent::ToolCall {
                tool: call.tool.clone(),
                args: call.args.clone(),
            });
            tools_used.push(call.tool.clone());

            let result = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    self.send_event(ReactEvent::Error { text: "Cancelled by user".to_string() });
                    return Err(AgentError::Cancelled);
                }
                r = self.executor.execute(&call.tool, call.args.clone()) => r,
            };
            let observation = match result {
                Ok(r) => r,
                Err(e) => {
                    self.send_event(ReactEvent::ToolFailure {
                        tool: call.tool.clone(),
                        reason: e.to_string(),
                    });
                    format!("Error: {}", e)
                }
            };

            let mut preview: String = observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
            if observation.chars().count() > OBSERVATION_PREVIEW_CHARS {
                preview.push_str("...");
            }
            self.send_event(ReactEvent::Observation {
                tool: call.tool.clone(),
                preview,
            });

            scratchpad.push(Message::assistant(output));
            scratchpad.push(Message::user(format!(
                "Observation from {}: {}",
                call.tool, observation
            )));
        }
    }

    /// 解析类错误：RetryWithPrompt 时把原输出与提示写回 scratchpad，否则返回错误
    fn retry_or_abort(
        &self,
        err: AgentError,
        output: &str,
        scratchpad: &mut Vec<Message>,
    ) -> Result<(), AgentError> {
        match self.recovery.handle(&err, &self.executor.tool_names()) {
            RecoveryAction::RetryWithPrompt(prompt) => {
                self.send_event(ReactEvent::Recovery {
                    action: "RetryWithPrompt".to_string(),
                    detail: prompt.clone(),
                });
                scratchpad.push(Message::assistant(output));
                scratchpad.push(Message::user(prompt));
                Ok(())
            }
            RecoveryAction::Abort => {
                self.send_event(ReactEvent::Error {
                    text: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            args["text"]
                .as_str()
                .map(|s| s.to_uppercase())
                .ok_or_else(|| "missing text".to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        ToolExecutor::new(reg, 5)
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "upper", "args": {"text": "hi"}}"#,
            "The answer is HI.",
        ]));
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new())
            .with_event_tx(&tx);

        let out = session.run("system", "say hi").await.unwrap();
        assert_eq!(out.response, "The answer is HI.");
        assert_eq!(out.tools_used, vec!["upper"]);
        assert_eq!(out.steps, 2);
        assert!(!out.hit_limit);

        // 第二次请求：system + user + assistant(tool call) + observation
        let second = mock.request(1).unwrap();
        assert_eq!(second.len(), 4);
        assert_eq!(second[3].content, "Observation from upper: HI");

        drop(tx);
        let mut saw_observation = false;
        while let Some(ev) = rx.recv().await {
            if let ReactEvent::Observation { preview, .. } = ev {
                assert_eq!(preview, "HI");
                saw_observation = true;
            }
        }
        assert!(saw_observation);
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "upper", "args": {}}"#,
            "done",
        ]));
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new());
        let out = session.run("system", "q").await.unwrap();
        assert_eq!(out.response, "done");
        let second = mock.request(1).unwrap();
        assert_eq!(
            second[3].content,
            "Observation from upper: Error: Tool execution failed: missing text"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_retried_with_valid_names() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "order_labs", "args": {}}"#,
            "fallback answer",
        ]));
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new());
        let out = session.run("system", "q").await.unwrap();
        assert_eq!(out.response, "fallback answer");
        assert!(out.tools_used.is_empty());
        let retry = mock.request(1).unwrap();
        assert_eq!(retry.last().unwrap().content, "order_labs is not a valid tool, try one of [upper].");
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let call = r#"{"tool": "upper", "args": {"text": "again"}}"#;
        let mock = Arc::new(MockLlmClient::scripted([call, call, call]));
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new())
            .with_max_iterations(2);
        let out = session.run("system", "q").await.unwrap();
        assert!(out.hit_limit);
        assert_eq!(out.steps, 2);
        assert_eq!(mock.call_count(), 2);
        assert!(out
            .response
            .starts_with("Agent stopped after reaching the iteration limit (2 steps)."));
        assert!(out.response.contains("again"));
        assert_eq!(out.tools_used.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_error_aborts() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("503 unavailable");
        let planner = Planner::new(mock);
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new());
        let err = session.run("system", "q").await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(ref m) if m == "503 unavailable"));
    }

    #[tokio::test]
    async fn test_prose_quoting_tool_is_final_answer() {
        let answer = r#"A spacer is a "tool" that improves inhaler delivery."#;
        let mock = Arc::new(MockLlmClient::scripted([answer, answer, answer]));
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new())
            .with_max_iterations(3);
        let out = session.run("system", "What is a spacer?").await.unwrap();
        assert_eq!(out.response, answer);
        assert_eq!(out.steps, 1);
        assert!(!out.hit_limit);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_llm_timeout_is_retried() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("request timed out after 60s");
        mock.push_reply("Recovered answer");
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let session = ReactSession::new(&planner, &exec, &recovery, CancellationToken::new());
        let out = session.run("system", "q").await.unwrap();
        assert_eq!(out.response, "Recovered answer");
        assert_eq!(out.steps, 2);
        let retry = mock.request(1).unwrap();
        assert_eq!(
            retry.last().unwrap().content,
            "The previous request timed out. Please continue."
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mock = Arc::new(MockLlmClient::new());
        let planner = Planner::new(mock.clone());
        let exec = executor();
        let recovery = RecoveryEngine::new();
        let token = CancellationToken::new();
        token.cancel();
        let session = ReactSession::new(&planner, &exec, &recovery, token);
        let err = session.run("system", "q").await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }
}

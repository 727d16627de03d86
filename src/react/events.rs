//! ReAct 过程事件：供 TUI 展示步数、思考、工具调用与观察

use serde::Serialize;

/// 单步过程事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 当前第几步（从 1 开始）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation { tool: String, preview: String },
    /// 工具执行失败或超时
    ToolFailure { tool: String, reason: String },
    /// 恢复动作（RetryWithPrompt / Abort）
    Recovery { action: String, detail: String },
    Error { text: String },
}

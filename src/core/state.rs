//! 状态定义：UiState 投影
//!
//! UI 只持有轻量的 UiState（阶段、历史、锁、错误、统计）；Agent 的完整状态由编排器持有并投影到 UiState。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::agent::AgentStatistics;
use crate::memory::Message;

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Default, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    pub history: Vec<Message>,
    pub active_tool: Option<String>,
    pub step: usize,
    pub input_locked: bool,
    pub error_message: Option<String>,
    /// 一次性提示（上传成功、导出路径等）
    pub notice: Option<String>,
    pub stats: AgentStatistics,
    /// 最近一次查询的工具调用次数
    pub last_tool_counts: BTreeMap<String, usize>,
}

/// Agent 阶段（UI 投影用）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    #[default]
    Idle,
    Guarding,
    Thinking,
    ToolExecuting,
    Error,
}

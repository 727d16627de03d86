//! MedAssist - 医学问答智能体
//!
//! 模块划分：
//! - **agent**: MedicalAgent（Guard → ReAct → 对话记忆）与 build_agent 装配
//! - **config**: 应用配置加载（TOML + 环境变量）与 API Key
//! - **core**: 错误与恢复、数据模型、UI 状态投影、编排器
//! - **llm**: LLM / 视觉 / 嵌入客户端抽象与实现（Gemini OpenAI 兼容端点 / Mock）
//! - **memory**: 对话记忆
//! - **observability**: tracing 初始化
//! - **react**: Planner、System Prompt、ReAct 主循环
//! - **services**: 知识库检索、影像处理、医学相关性 Guard
//! - **tools**: 知识库 / 网页检索 / 影像分析 / 医学计算器与执行器
//! - **ui**: Ratatui TUI 界面

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod services;
pub mod tools;
pub mod ui;

pub use agent::{build_agent, MedicalAgent, QueryOptions};

//! 认知层：Planner（LLM 调用与 Tool Call 解析）、System Prompt 组装、ReAct 主循环

pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompt;

pub use events::ReactEvent;
pub use loop_::{ReactOutcome, ReactSession};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
pub use prompt::build_system_prompt;

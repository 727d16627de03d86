//! 核心编排层：错误与恢复、数据模型、状态投影、主控循环

pub mod error;
pub mod models;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use models::{ImageMetadata, QueryResult};
pub use orchestrator::{create_agent, Command};
pub use recovery::RecoveryEngine;
pub use state::{AgentPhase, UiState};

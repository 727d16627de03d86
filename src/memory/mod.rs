//! 记忆层：短期对话记忆（仅内存，不持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, ExportedMessage, Message, Role};

//! 短期记忆：对话历史
//!
//! 以 user/assistant 对为单位原子追加，保留最近 N 轮，超出时成对丢弃最旧的消息；
//! 供 prompt 注入（get_recent_context）与 UI 渲染使用。

use std::collections::BTreeSet;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 注入 prompt 时 assistant 回复的预览长度（字符）
const ASSISTANT_PREVIEW_CHARS: usize = 150;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now(),
            tools_used: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }
}

/// export_history 的单条导出记录
#[derive(Clone, Debug, Serialize)]
pub struct ExportedMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
    pub tools_used: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// 短期记忆：最近 max_turns 轮对话（实际保留至多 max_turns*2 条消息，长度恒为偶数）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        tracing::info!(max_turns, "conversation memory initialized");
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// 原子追加一轮问答，随后剪枝
    pub fn add_exchange(
        &mut self,
        user_query: impl Into<String>,
        assistant_response: impl Into<String>,
        tools_used: Vec<String>,
    ) {
        self.messages.push(Message::user(user_query));
        self.messages
            .push(Message::assistant(assistant_response).with_tools(tools_used));
        self.prune();
        tracing::debug!(total = self.messages.len(), "exchange added");
    }

    /// 超出 max_turns*2 时从头部丢弃，保留最近部分（上限为偶数，故总是整对丢弃）
    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    /// 最近 n 轮对话渲染为文本块，assistant 内容截断为预览
    pub fn get_recent_context(&self, n: usize) -> String {
        if self.messages.is_empty() {
            return "No recent conversation.".to_string();
        }

        let start = self.messages.len().saturating_sub(n * 2);
        let recent = &self.messages[start..];

        let mut parts = vec!["RECENT CONVERSATION CONTEXT:\n".to_string()];
        for pair in recent.chunks_exact(2) {
            let preview: String = pair[1].content.chars().take(ASSISTANT_PREVIEW_CHARS).collect();
            parts.push(format!("User: {}\nAssistant: {}...\n", pair[0].content, preview));
        }
        parts.join("\n")
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        tracing::info!("conversation history cleared");
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn turns(&self) -> usize {
        self.messages.len() / 2
    }

    /// "Turns: N, Tools used: a, b"；工具名按字母序
    pub fn summary(&self) -> String {
        if self.messages.is_empty() {
            return "No conversation history".to_string();
        }
        let tools: BTreeSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tools_used.iter().map(String::as_str))
            .collect();
        let tools = if tools.is_empty() {
            "None".to_string()
        } else {
            tools.into_iter().collect::<Vec<_>>().join(", ")
        };
        format!("Turns: {}, Tools used: {}", self.turns(), tools)
    }

    pub fn export_history(&self) -> Vec<ExportedMessage> {
        self.messages
            .iter()
            .map(|m| ExportedMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                timestamp: m.timestamp.to_rfc3339(),
                tools_used: m.tools_used.clone(),
                metadata: m.metadata.clone(),
            })
            .collect()
    }
}

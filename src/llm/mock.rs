//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序返回预置的回复（可包含 Err 模拟模型故障）；脚本耗尽后把最后一条 User 消息回显为最终回答。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, VisionClient};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复 + 记录收到的请求
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: impl Into<String>) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Err(err.into()));
        }
    }

    /// 已收到的请求数
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 第 i 次请求的消息
    pub fn request(&self, i: usize) -> Option<Vec<Message>> {
        self.requests.lock().ok().and_then(|r| r.get(i).cloned())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => reply,
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(format!("Echo from Mock: {}", last_user))
            }
        }
    }
}

#[async_trait]
impl VisionClient for MockLlmClient {
    async fn analyze_image(&self, prompt: &str, _image_data_url: &str) -> Result<String, String> {
        self.complete(&[Message::user(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::scripted(["first"]);
        mock.push_error("boom");
        assert_eq!(mock.complete(&[Message::user("hi")]).await.unwrap(), "first");
        assert_eq!(mock.complete(&[Message::user("hi")]).await.unwrap_err(), "boom");
        assert_eq!(
            mock.complete(&[Message::user("hi")]).await.unwrap(),
            "Echo from Mock: hi"
        );
        assert_eq!(mock.call_count(), 3);
    }
}

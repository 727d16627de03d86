//! 视觉模型客户端
//!
//! 以 OpenAI 兼容 chat/completions 格式发送「文本 + image_url（base64 data URL）」的多模态消息。
//! 复用 OpenAiClient 的连接、超时与 token 统计。

use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use async_trait::async_trait;

use crate::llm::OpenAiClient;

/// 视觉分析 trait：prompt + 已编码影像（data URL）→ 模型文本
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze_image(&self, prompt: &str, image_data_url: &str) -> Result<String, String>;
}

/// 构造单条 user 消息的多模态请求（影像按 high detail 发送）
pub fn vision_request(
    model: &str,
    prompt: &str,
    image_data_url: &str,
    max_tokens: u32,
) -> Result<CreateChatCompletionRequest, String> {
    let text = ChatCompletionRequestMessageContentPartTextArgs::default()
        .text(prompt)
        .build()
        .map_err(|e| e.to_string())?;
    let image = ChatCompletionRequestMessageContentPartImageArgs::default()
        .image_url(
            ImageUrlArgs::default()
                .url(image_data_url)
                .detail(ImageDetail::High)
                .build()
                .map_err(|e| e.to_string())?,
        )
        .build()
        .map_err(|e| e.to_string())?;
    let message = ChatCompletionRequestUserMessageArgs::default()
        .content(vec![
            ChatCompletionRequestUserMessageContentPart::Text(text),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(image),
        ])
        .build()
        .map_err(|e| e.to_string())?;

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(vec![ChatCompletionRequestMessage::User(message)])
        .temperature(0.0)
        .max_completion_tokens(max_tokens)
        .build()
        .map_err(|e| e.to_string())
}

#[async_trait]
impl VisionClient for OpenAiClient {
    async fn analyze_image(&self, prompt: &str, image_data_url: &str) -> Result<String, String> {
        let request = vision_request(
            self.model_name(),
            prompt,
            image_data_url,
            self.sampling().max_output_tokens,
        )?;
        let content = self.send(request).await?;
        if content.trim().is_empty() {
            return Err("No response from vision model".to_string());
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::llm::{LlmClient, TIMEOUT_PREFIX};

    /// 读完一个 HTTP 请求（按 Content-Length），返回请求体
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(idx) = text.find("\r\n\r\n") {
                let len = text[..idx]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= idx + 4 + len {
                    return String::from_utf8_lossy(&buf[idx + 4..idx + 4 + len]).to_string();
                }
            }
            if n == 0 {
                return String::new();
            }
        }
    }

    /// 单次应答的 chat/completions 桩服务；返回 base_url 与收到的请求体
    async fn stub_server(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let body = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            body
        });
        (format!("http://{}/v1", addr), handle)
    }

    const COMPLETION: &str = r#"{"id":"c1","object":"chat.completion","created":1,"model":"gemini-2.5-flash-lite","choices":[{"index":0,"message":{"role":"assistant","content":"No acute fracture."},"finish_reason":"stop"}],"usage":{"prompt_tokens":120,"completion_tokens":8,"total_tokens":128}}"#;

    #[tokio::test]
    async fn test_analyze_image_counts_tokens_on_shared_client() {
        let (base_url, server) = stub_server(COMPLETION).await;
        let client = OpenAiClient::new(Some(&base_url), "gemini-2.5-flash-lite", Some("k"));
        let text = client
            .analyze_image("Check for fractures", "data:image/jpeg;base64,AAAA")
            .await
            .unwrap();
        assert_eq!(text, "No acute fracture.");
        assert_eq!(client.token_usage(), (120, 8, 128));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["messages"][0]["content"][1]["type"], "image_url");
    }

    #[tokio::test]
    async fn test_analyze_image_timeout_uses_timeout_prefix() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let client = OpenAiClient::new(Some(&format!("http://{}/v1", addr)), "m", Some("k"))
            .with_timeout(Duration::from_millis(300));
        let err = client
            .analyze_image("Check for fractures", "data:image/jpeg;base64,AAAA")
            .await
            .unwrap_err();
        assert!(err.starts_with(TIMEOUT_PREFIX), "{err}");
    }

    #[test]
    fn test_request_serializes_multimodal_parts() {
        let request = vision_request(
            "gemini-2.5-flash-lite",
            "Check for fractures",
            "data:image/jpeg;base64,AAAA",
            256,
        )
        .unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gemini-2.5-flash-lite");
        assert_eq!(json["max_completion_tokens"], 256);
        let message = &json["messages"][0];
        assert_eq!(message["role"], "user");
        let parts = &message["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "Check for fractures");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
        assert_eq!(parts[1]["image_url"]["detail"], "high");
    }
}

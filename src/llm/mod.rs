//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / 视觉 / 嵌入 / Mock）

pub mod embedding;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod vision;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use gemini::create_gemini_client;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, Sampling, TokenUsage};
pub use traits::{LlmClient, TIMEOUT_PREFIX};
pub use vision::{vision_request, VisionClient};

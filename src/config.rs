//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 `.env`（dotenvy），再读 TOML 文件，最后用环境变量 `MEDASSIST__*` 覆盖
//! （双下划线表示嵌套，如 `MEDASSIST__AGENT__MAX_ITERATIONS=8`）。
//! API Key 只从环境变量读取，见 [`Secrets`]。

use std::path::PathBuf;

use serde::Deserialize;

/// Gemini 的 OpenAI 兼容端点
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub knowledge: KnowledgeSection,
    pub search: SearchSection,
    pub guard: GuardSection,
    pub image: ImageSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// TUI 日志目录，默认 logs
    pub log_dir: Option<PathBuf>,
}

/// [llm] 段：托管模型（文本与视觉共用）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// 未设置时使用 Gemini 的 OpenAI 兼容端点
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-lite".to_string(),
            base_url: None,
            temperature: 0.0,
            max_output_tokens: 4096,
            request_timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(GEMINI_OPENAI_BASE_URL)
    }
}

/// [agent] 段：ReAct 步数上限、记忆轮数、Guard 开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// 对话历史保留轮数（每轮 user + assistant 两条）
    pub max_memory_turns: usize,
    /// 注入 prompt 的最近轮数
    pub context_turns: usize,
    pub enable_guard: bool,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_memory_turns: 10,
            context_turns: 3,
            enable_guard: true,
            tool_timeout_secs: 60,
        }
    }
}

/// [knowledge] 段：向量库索引与嵌入模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub index_name: String,
    /// 直接指定索引 host 时跳过 describe-index 调用
    pub index_host: Option<String>,
    pub control_plane_url: String,
    pub top_k: usize,
    pub timeout_secs: u64,
    pub embedding: EmbeddingSection,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            index_name: "medical-pdf-index".to_string(),
            index_host: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            top_k: 10,
            timeout_secs: 30,
            embedding: EmbeddingSection::default(),
        }
    }
}

/// [knowledge.embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// openai（OpenAI 兼容 /embeddings 端点）或 local（fastembed，需 local-embeddings feature）
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            base_url: None,
        }
    }
}

/// [search] 段：SerpAPI
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub num_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://serpapi.com/search.json".to_string(),
            num_results: 5,
            timeout_secs: 15,
        }
    }
}

/// [guard] 段：关键词与动词短语（小写子串匹配）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    pub medical_keywords: Vec<String>,
    pub medical_verbs: Vec<String>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            medical_keywords: default_medical_keywords(),
            medical_verbs: default_medical_verbs(),
        }
    }
}

fn default_medical_keywords() -> Vec<String> {
    [
        "symptom", "disease", "treatment", "diagnosis", "medical", "health",
        "patient", "doctor", "hospital", "clinic", "medication", "drug",
        "pain", "fever", "infection", "cancer", "diabetes", "surgery",
        "prescription", "therapy", "clinical", "pharmaceutical", "radiology",
        "x-ray", "mri", "ct scan", "blood", "test", "laboratory", "anatomy",
        "pathology", "cardiology", "neurology", "oncology",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_medical_verbs() -> Vec<String> {
    [
        "analyze", "diagnosis", "examine", "assess", "evaluate",
        "check", "look at", "review", "interpret",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [image] 段：URL 下载与视觉输入尺寸
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSection {
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    /// 发送给视觉模型前的最大边长
    pub max_dimension: u32,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            user_agent: "MedicalAI/2.0".to_string(),
            max_dimension: 1600,
        }
    }
}

/// 外部服务的 API Key（只来自环境变量 / .env）
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub google_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub serpapi_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            google_api_key: non_empty_env("GOOGLE_API_KEY"),
            pinecone_api_key: non_empty_env("PINECONE_API_KEY"),
            serpapi_key: non_empty_env("SERPAPI_KEY"),
        }
    }

    /// 缺失的 Key 名称，用于启动时告警
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.google_api_key.is_none() {
            out.push("GOOGLE_API_KEY");
        }
        if self.pinecone_api_key.is_none() {
            out.push("PINECONE_API_KEY");
        }
        if self.serpapi_key.is_none() {
            out.push("SERPAPI_KEY");
        }
        out
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// 从 config 目录加载配置，环境变量 MEDASSIST__* 可覆盖
///
/// 1. 读取 `.env`（不存在时忽略）
/// 2. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 3. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 4. 最后叠加环境变量 MEDASSIST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let _ = dotenvy::dotenv();

    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MEDASSIST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

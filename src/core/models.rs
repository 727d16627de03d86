//! 对外数据模型：查询结果、影像元数据

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};

/// 单次查询的结果（无论成功、被 Guard 拒绝或失败都返回此结构）
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub response: String,
    pub success: bool,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
    /// 按首次使用顺序去重
    pub tools_used: Vec<String>,
    pub tool_call_counts: BTreeMap<String, usize>,
    pub metadata: Map<String, Value>,
}

impl QueryResult {
    pub fn rejected(response: String, reason: String) -> Self {
        Self {
            response,
            success: false,
            rejected: true,
            rejection_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn failed(response: String, error: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            response,
            success: false,
            metadata,
            ..Default::default()
        }
    }
}

/// 上传影像的元数据
#[derive(Debug, Clone, Serialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// 解码时识别出的格式（如 Png / Jpeg），未知为 "Unknown"
    pub format: String,
    pub uploaded_at: DateTime<Local>,
}

impl ImageMetadata {
    /// "(宽, 高)" 形式，用于 prompt 中的 IMAGE_SIZE
    pub fn size_label(&self) -> String {
        format!("({}, {})", self.width, self.height)
    }
}

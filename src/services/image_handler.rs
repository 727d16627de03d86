//! 影像处理服务：加载、登记上传、待分析（pending）状态与视觉模型输入编码
//!
//! ImageLoader 负责 IO（本地路径 / http(s) URL / 原始字节）；ImageHandler 只维护内存状态，
//! 由 Agent 与影像分析工具通过 [`SharedImageHandler`] 共享。

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use tokio::sync::Mutex;

use crate::config::ImageSection;
use crate::core::{AgentError, ImageMetadata};

/// Agent 与工具共享的影像状态
pub type SharedImageHandler = Arc<Mutex<ImageHandler>>;

/// 影像来源
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// http(s):// 开头视为 URL，否则视为本地路径
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            ImageSource::Url(s.to_string())
        } else {
            ImageSource::Path(PathBuf::from(s))
        }
    }

    /// 未显式给出文件名时的默认名
    pub fn default_filename(&self) -> String {
        match self {
            ImageSource::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "uploaded_image".to_string()),
            ImageSource::Url(u) => u
                .split('?')
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|n| !n.is_empty())
                .unwrap_or("uploaded_image")
                .to_string(),
            ImageSource::Bytes(_) => "uploaded_image".to_string(),
        }
    }
}

/// 解码后的影像（已转 RGB）与原始格式
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
}

/// 影像加载器：URL 下载带 User-Agent 与超时
pub struct ImageLoader {
    client: Client,
}

impl ImageLoader {
    pub fn new(cfg: &ImageSection) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| AgentError::Initialization(format!("Image HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn load(&self, source: ImageSource) -> Result<LoadedImage, AgentError> {
        let bytes = match source {
            ImageSource::Bytes(b) => b,
            ImageSource::Path(p) => tokio::fs::read(&p).await.map_err(|e| {
                AgentError::ImageProcessing(format!("Image load failed: {}: {}", p.display(), e))
            })?,
            ImageSource::Url(url) => {
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| AgentError::ImageProcessing(format!("Image load failed: {}", e)))?;
                resp.bytes()
                    .await
                    .map_err(|e| AgentError::ImageProcessing(format!("Image load failed: {}", e)))?
                    .to_vec()
            }
        };
        decode_image(&bytes)
    }
}

/// 从内存解码并统一转为 RGB
pub fn decode_image(bytes: &[u8]) -> Result<LoadedImage, AgentError> {
    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes).map_err(|e| {
        tracing::error!(error = %e, "failed to decode image");
        AgentError::ImageProcessing(format!("Image load failed: {}", e))
    })?;
    Ok(LoadedImage {
        image: DynamicImage::ImageRgb8(image.to_rgb8()),
        format,
    })
}

/// 缩放到 max_dimension 以内并编码为 JPEG base64 data URL
pub fn encode_for_vision(img: &DynamicImage, max_dimension: u32) -> Result<String, AgentError> {
    let (w, h) = (img.width(), img.height());
    let resized;
    let img = if w > max_dimension || h > max_dimension {
        let scale = max_dimension as f32 / w.max(h) as f32;
        let nw = ((w as f32 * scale) as u32).max(1);
        let nh = ((h as f32 * scale) as u32).max(1);
        resized = img.resize_exact(nw, nh, image::imageops::FilterType::Lanczos3);
        &resized
    } else {
        img
    };

    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .map_err(|e| AgentError::ImageProcessing(format!("Failed to encode image: {}", e)))?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buffer)))
}

/// 已登记的影像
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image: Arc<DynamicImage>,
    pub metadata: ImageMetadata,
}

/// 影像状态：按上传顺序登记（同名覆盖原位置），最近一次上传标记为 pending
#[derive(Debug, Default)]
pub struct ImageHandler {
    uploaded: Vec<(String, StoredImage)>,
    pending: Option<String>,
}

impl ImageHandler {
    pub fn new() -> Self {
        tracing::info!("image handler initialized");
        Self::default()
    }

    pub fn shared() -> SharedImageHandler {
        Arc::new(Mutex::new(Self::new()))
    }

    /// 登记上传并设为 pending
    pub fn store_image(&mut self, loaded: LoadedImage, filename: &str) -> ImageMetadata {
        let metadata = ImageMetadata {
            filename: filename.to_string(),
            width: loaded.image.width(),
            height: loaded.image.height(),
            format: loaded
                .format
                .map(|f| format!("{:?}", f).to_uppercase())
                .unwrap_or_else(|| "Unknown".to_string()),
            uploaded_at: Local::now(),
        };
        let stored = StoredImage {
            image: Arc::new(loaded.image),
            metadata: metadata.clone(),
        };
        match self.uploaded.iter_mut().find(|(name, _)| name == filename) {
            Some(slot) => slot.1 = stored,
            None => self.uploaded.push((filename.to_string(), stored)),
        }
        self.pending = Some(filename.to_string());
        tracing::info!(
            filename,
            pending = self.has_pending(),
            total = self.uploaded.len(),
            "image stored"
        );
        metadata
    }

    /// 取出并清除 pending 影像
    pub fn take_pending(&mut self) -> Option<StoredImage> {
        let name = self.pending.take()?;
        self.get(&name)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn get(&self, filename: &str) -> Option<StoredImage> {
        self.uploaded
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, s)| s.clone())
    }

    /// 最近登记的影像
    pub fn latest_uploaded(&self) -> Option<StoredImage> {
        self.uploaded.last().map(|(_, s)| s.clone())
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }

    pub fn clear_all(&mut self) {
        self.uploaded.clear();
        self.pending = None;
        tracing::info!("all images cleared");
    }

    /// 注入 system prompt 的影像状态块
    pub fn image_context(&self) -> String {
        if !self.has_pending() {
            return "IMAGE_STATUS: No image uploaded".to_string();
        }
        match self.pending.as_deref().and_then(|name| self.get(name)) {
            Some(stored) => format!(
                "IMAGE_STATUS: Image available\n\
                 IMAGE_FILE: {}\n\
                 IMAGE_SIZE: {}\n\
                 NOTE: User has uploaded a medical image. You can analyze it using analyze_medical_image tool.",
                stored.metadata.filename,
                stored.metadata.size_label()
            ),
            None => "IMAGE_STATUS: Image available (filename unknown)".to_string(),
        }
    }
}

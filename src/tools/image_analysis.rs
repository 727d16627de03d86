//! analyze_medical_image：对已上传的医学影像做结构化放射学分析
//!
//! 优先使用 pending 影像（取用后清除），否则回退到最近一次上传；两者皆无时返回上传指引。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::VisionClient;
use crate::services::{encode_for_vision, SharedImageHandler, StoredImage};
use crate::tools::schema::args_schema;
use crate::tools::Tool;

const RULE: &str = "======================================================================";

pub const NO_IMAGE_MESSAGE: &str = "No medical image found.

Please upload an image first:
1. Use /upload <path|url> in the input box
2. Select your medical image (X-ray, CT, MRI, etc.)
3. Wait for the \"Image uploaded\" confirmation
4. Then ask me to analyze it again

The image must be uploaded before I can analyze it.";

#[derive(Debug, Deserialize, JsonSchema)]
struct ImageAnalysisArgs {
    /// What to look for, e.g. "Check for fractures in this X-ray"
    query: String,
}

pub struct ImageAnalysisTool {
    images: SharedImageHandler,
    vision: Arc<dyn VisionClient>,
    model_label: String,
    max_dimension: u32,
}

impl ImageAnalysisTool {
    pub fn new(
        images: SharedImageHandler,
        vision: Arc<dyn VisionClient>,
        model_label: impl Into<String>,
        max_dimension: u32,
    ) -> Self {
        Self {
            images,
            vision,
            model_label: model_label.into(),
            max_dimension,
        }
    }

    async fn pick_image(&self) -> Option<StoredImage> {
        let mut handler = self.images.lock().await;
        if let Some(img) = handler.take_pending() {
            tracing::info!(filename = %img.metadata.filename, "using pending image");
            return Some(img);
        }
        let latest = handler.latest_uploaded();
        if latest.is_none() {
            tracing::warn!(
                pending = handler.has_pending(),
                uploaded = handler.uploaded_count(),
                "no image available for analysis"
            );
        }
        latest
    }
}

pub fn radiology_prompt(query: &str) -> String {
    format!(
        "You are an expert radiologist with 30+ years of experience.

Analyze this medical image and provide a detailed, structured report.

Query: {query}

Structure your analysis as follows:

1. IMAGE TYPE & QUALITY
   - Imaging modality identification
   - Technical quality assessment

2. ANATOMICAL STRUCTURES
   - Visible anatomical structures
   - Positioning and orientation

3. KEY FINDINGS
   - Normal findings
   - Abnormal findings (if any)

4. PATHOLOGICAL FEATURES
   - Detailed description of any pathology
   - Location, size, characteristics

5. SEVERITY ASSESSMENT
   - Mild / Moderate / Severe (if applicable)

6. DIFFERENTIAL DIAGNOSIS
   - Most likely diagnosis
   - Alternative diagnoses to consider

7. RECOMMENDATIONS
   - Additional imaging needed
   - Clinical correlation suggested
   - Follow-up recommendations

Use precise medical terminology. Be thorough and evidence-based."
    )
}

fn format_report(query: &str, filename: &str, model: &str, analysis: &str) -> String {
    format!(
        "MEDICAL IMAGE ANALYSIS REPORT
{RULE}

Query: {query}
Image: {filename}
Analysis Model: {model}
Date: {date}

{RULE}
RADIOLOGICAL ANALYSIS:
{RULE}

{analysis}

{RULE}
MEDICAL DISCLAIMER:
This AI-generated analysis is for educational and informational purposes
only. It should NOT be used as a substitute for professional medical
advice, diagnosis, or treatment. Always consult qualified healthcare
professionals for medical decisions.
{RULE}
",
        date = Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

#[async_trait]
impl Tool for ImageAnalysisTool {
    fn name(&self) -> &str {
        "analyze_medical_image"
    }

    fn description(&self) -> &str {
        "Analyze the uploaded medical image (X-ray, CT, MRI, ultrasound) with a vision model. \
         The image must be uploaded first; the most recent upload is used automatically. \
         Use for detecting abnormalities, fractures, tumors, lesions and radiological assessments."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ImageAnalysisArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ImageAnalysisArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {}", e))?;

        let Some(stored) = self.pick_image().await else {
            return Ok(NO_IMAGE_MESSAGE.to_string());
        };
        let filename = stored.metadata.filename.clone();
        tracing::info!(filename = %filename, "analyzing image");

        // 缩放与 JPEG 编码是 CPU 密集操作
        let max_dimension = self.max_dimension;
        let image = stored.image.clone();
        let data_url = tokio::task::spawn_blocking(move || encode_for_vision(&image, max_dimension))
            .await
            .map_err(|e| format!("Analysis failed: {}", e))?
            .map_err(|e| format!("Analysis failed: {}", e))?;

        let analysis = self
            .vision
            .analyze_image(&radiology_prompt(&args.query), &data_url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "vision model call failed");
                format!("Analysis failed: {}", e)
            })?;

        Ok(format_report(&args.query, &filename, &self.model_label, &analysis))
    }
}

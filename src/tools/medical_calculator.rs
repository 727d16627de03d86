//! calculate_medical_metric：常用临床指标计算（BMI、eGFR、CHADS2）
//!
//! parameters 可以是 JSON 对象，也可以是 JSON 编码的字符串；calculation_type 大小写不敏感。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
struct CalculatorArgs {
    /// One of: BMI, EGFR, CHADS2
    calculation_type: String,
    /// Parameters as a JSON object (or JSON string), e.g. {"weight_kg": 70, "height_m": 1.75}
    parameters: Value,
}

pub struct MedicalCalculatorTool;

impl MedicalCalculatorTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MedicalCalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

/// 字符串形式时再解析一次；解析结果必须是对象
fn parse_parameters(raw: &Value) -> Option<Map<String, Value>> {
    let value = match raw {
        Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
        other => other.clone(),
    };
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn number(params: &Map<String, Value>, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(params: &Map<String, Value>, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "y" | "1"),
        _ => false,
    }
}

/// 按类型分派；返回给模型的文本（错误也以文本返回）
pub fn calculate(calculation_type: &str, parameters: &Value) -> String {
    let Some(params) = parse_parameters(parameters) else {
        return "Invalid JSON format for parameters".to_string();
    };
    match calculation_type.trim().to_uppercase().as_str() {
        "BMI" => bmi(&params),
        "EGFR" => egfr(&params),
        "CHADS2" => chads2(&params),
        _ => format!("Calculation '{}' not supported", calculation_type),
    }
}

fn bmi(params: &Map<String, Value>) -> String {
    let (Some(weight), Some(height)) = (number(params, "weight_kg"), number(params, "height_m")) else {
        return "BMI requires 'weight_kg' and 'height_m'".to_string();
    };
    if weight <= 0.0 || height <= 0.0 {
        return "BMI requires 'weight_kg' and 'height_m'".to_string();
    }

    let bmi = weight / (height * height);
    let (category, risk) = if bmi < 18.5 {
        ("Underweight", "Increased risk of malnutrition")
    } else if bmi < 25.0 {
        ("Normal weight", "Healthy weight range")
    } else if bmi < 30.0 {
        ("Overweight", "Increased health risks")
    } else {
        ("Obese", "Significant health risks")
    };

    format!(
        "BMI CALCULATION RESULT:

BMI: {bmi:.1} kg/m²
Category: {category}
Assessment: {risk}

Reference Ranges:
- Underweight: < 18.5
- Normal: 18.5 - 24.9
- Overweight: 25.0 - 29.9
- Obese: ≥ 30.0"
    )
}

/// CKD-EPI 2021（不含种族系数）
pub fn ckd_epi_2021(creatinine_mg_dl: f64, age: f64, female: bool) -> f64 {
    let (kappa, alpha) = if female { (0.7, -0.241) } else { (0.9, -0.302) };
    let ratio = creatinine_mg_dl / kappa;
    let mut egfr =
        142.0 * ratio.min(1.0).powf(alpha) * ratio.max(1.0).powf(-1.200) * 0.9938_f64.powf(age);
    if female {
        egfr *= 1.012;
    }
    egfr
}

fn ckd_stage(egfr: f64) -> (&'static str, &'static str) {
    if egfr >= 90.0 {
        ("G1", "Normal or high")
    } else if egfr >= 60.0 {
        ("G2", "Mildly decreased")
    } else if egfr >= 45.0 {
        ("G3a", "Mildly to moderately decreased")
    } else if egfr >= 30.0 {
        ("G3b", "Moderately to severely decreased")
    } else if egfr >= 15.0 {
        ("G4", "Severely decreased")
    } else {
        ("G5", "Kidney failure")
    }
}

fn egfr(params: &Map<String, Value>) -> String {
    const USAGE: &str = "eGFR requires 'creatinine_mg_dl', 'age' and 'sex' (male/female)";
    let (Some(scr), Some(age)) = (number(params, "creatinine_mg_dl"), number(params, "age")) else {
        return USAGE.to_string();
    };
    let female = match params.get("sex").and_then(Value::as_str).map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "female" || s == "f" => true,
        Some(s) if s == "male" || s == "m" => false,
        _ => return USAGE.to_string(),
    };
    if scr <= 0.0 || age <= 0.0 {
        return USAGE.to_string();
    }

    let value = ckd_epi_2021(scr, age, female);
    let (stage, label) = ckd_stage(value);
    format!(
        "eGFR CALCULATION RESULT (CKD-EPI 2021):

eGFR: {value:.0} mL/min/1.73m²
CKD Stage: {stage} ({label})

Reference Ranges:
- G1: ≥ 90
- G2: 60 - 89
- G3a: 45 - 59
- G3b: 30 - 44
- G4: 15 - 29
- G5: < 15"
    )
}

fn chads2(params: &Map<String, Value>) -> String {
    let age_75 = number(params, "age").map(|a| a >= 75.0).unwrap_or(false) || flag(params, "age_75");
    let items = [
        ("Congestive heart failure", flag(params, "chf"), 1),
        ("Hypertension", flag(params, "hypertension"), 1),
        ("Age ≥ 75", age_75, 1),
        ("Diabetes mellitus", flag(params, "diabetes"), 1),
        ("Prior stroke / TIA", flag(params, "stroke_tia"), 2),
    ];
    let score: u32 = items.iter().filter(|(_, on, _)| *on).map(|(_, _, pts)| pts).sum();

    // 年卒中率（%），按得分 0..=6
    const ANNUAL_STROKE_RATE: [f64; 7] = [1.9, 2.8, 4.0, 5.9, 8.5, 12.5, 18.2];
    let rate = ANNUAL_STROKE_RATE[score.min(6) as usize];
    let risk = match score {
        0 => "Low",
        1 => "Moderate",
        _ => "High",
    };

    let present: Vec<String> = items
        .iter()
        .filter(|(_, on, _)| *on)
        .map(|(name, _, pts)| format!("- {} (+{})", name, pts))
        .collect();
    let present = if present.is_empty() {
        "- None".to_string()
    } else {
        present.join("\n")
    };

    format!(
        "CHADS2 SCORE RESULT:

Score: {score}
Stroke Risk: {risk}
Estimated annual stroke rate: {rate:.1}%

Risk factors present:
{present}"
    )
}

#[async_trait]
impl Tool for MedicalCalculatorTool {
    fn name(&self) -> &str {
        "calculate_medical_metric"
    }

    fn description(&self) -> &str {
        "Calculate medical metrics and scores. Supported: BMI (weight_kg, height_m), \
         EGFR (creatinine_mg_dl, age, sex), CHADS2 (chf, hypertension, age, diabetes, stroke_tia). \
         Example: {\"calculation_type\": \"BMI\", \"parameters\": {\"weight_kg\": 70, \"height_m\": 1.75}}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CalculatorArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CalculatorArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {}", e))?;
        tracing::info!(calculation_type = %args.calculation_type, "medical calculation");
        Ok(calculate(&args.calculation_type, &args.parameters))
    }
}

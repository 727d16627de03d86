//! 工具层：Tool trait、注册表、带超时的执行器，以及四个医学工具

pub mod executor;
pub mod image_analysis;
pub mod knowledge_search;
pub mod medical_calculator;
pub mod registry;
pub mod schema;
pub mod web_search;

pub use executor::ToolExecutor;
pub use image_analysis::ImageAnalysisTool;
pub use knowledge_search::KnowledgeSearchTool;
pub use medical_calculator::MedicalCalculatorTool;
pub use registry::{Tool, ToolRegistry};
pub use schema::args_schema;
pub use web_search::WebSearchTool;

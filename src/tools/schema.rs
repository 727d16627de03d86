//! 工具参数 JSON Schema 生成（schemars）
//!
//! 每个工具的参数结构体派生 JsonSchema，schema 拼入 system prompt 的工具目录，减少 LLM 参数格式错误。

use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::Value;

/// 生成参数结构体的内联 JSON Schema（去掉 $schema / title 等噪音字段）
pub fn args_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct QueryArgs {
        /// Search text
        query: String,
    }

    #[test]
    fn test_args_schema_lists_required_fields() {
        let schema = args_schema::<QueryArgs>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["query"]["description"], "Search text");
        assert_eq!(schema["required"][0], "query");
        assert!(schema.get("title").is_none());
        assert!(schema.get("$schema").is_none());
    }
}

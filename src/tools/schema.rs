//! 工具参数 JSON Schema（schemars 自动生成）

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// employee_lookup 的参数
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct LookupArgs {
    /// 自然语言查询，例如 "engineers with Python skills in Berlin"
    pub query: String,
    /// 返回的最大档案数
    #[serde(default)]
    pub limit: Option<u32>,
}

/// 参数 schema 的 JSON 值，直接作为 ToolSpec.parameters
pub fn lookup_args_schema() -> Value {
    let schema = schema_for!(LookupArgs);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    // 部分兼容端点拒绝 $schema / title 字段
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

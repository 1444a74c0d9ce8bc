//! 员工语义检索工具
//!
//! 查询 → 嵌入 → 向量检索 → 并发取回完整档案。输出始终是合法 JSON 字符串：
//! 命中列表 `[{score, summary, employee}]`，或检索阶段失败时的 `{"error", "query"}`。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Map, Value};

use crate::llm::EmbeddingProvider;
use crate::store::{DocumentStore, SearchHit, VectorIndex};
use crate::tools::schema::{lookup_args_schema, LookupArgs};
use crate::tools::{Tool, ToolError};

pub const TOOL_NAME: &str = "employee_lookup";

/// 检索目标与条数
#[derive(Debug, Clone, PartialEq)]
pub struct LookupSettings {
    /// 向量索引集合
    pub vector_collection: String,
    /// 文档库集合
    pub document_collection: String,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            vector_collection: "employees".to_string(),
            document_collection: "employees".to_string(),
            default_limit: 100,
            max_limit: 100,
        }
    }
}

pub struct EmployeeLookupTool {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    documents: Arc<dyn DocumentStore>,
    settings: LookupSettings,
}

impl EmployeeLookupTool {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        documents: Arc<dyn DocumentStore>,
        settings: LookupSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            documents,
            settings,
        }
    }

    fn effective_limit(&self, requested: Option<u32>) -> usize {
        let max = self.settings.max_limit.max(1);
        requested
            .map(|l| l as usize)
            .unwrap_or(self.settings.default_limit)
            .clamp(1, max)
    }

    /// 执行检索；嵌入或向量检索失败时返回 `{"error", "query"}`
    pub async fn lookup(&self, query: &str, limit: usize) -> Value {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "embedding failed");
                return json!({ "error": format!("embedding failed: {}", e), "query": query });
            }
        };

        let collection = &self.settings.vector_collection;
        let hits = match self.index.search(collection, &vector, limit, true).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(query = %query, collection = %collection, error = %e, "vector search failed");
                return json!({ "error": format!("vector search failed: {}", e), "query": query });
            }
        };

        if hits.is_empty() {
            self.log_empty_collection(collection).await;
            return Value::Array(Vec::new());
        }

        tracing::debug!(query = %query, hits = hits.len(), "vector search hits");
        Value::Array(self.enrich(hits).await)
    }

    /// 并发取回档案；结果顺序与命中顺序一致，取不到的档案为 null
    async fn enrich(&self, hits: Vec<SearchHit>) -> Vec<Value> {
        let collection = &self.settings.document_collection;
        let records = join_all(
            hits.iter()
                .map(|hit| self.documents.find_by_id(collection, &hit.employee_id)),
        )
        .await;

        hits.into_iter()
            .zip(records)
            .map(|(hit, record)| {
                let employee = match record {
                    Ok(Some(rec)) => serde_json::to_value(rec).unwrap_or(Value::Null),
                    Ok(None) => Value::Null,
                    Err(e) => {
                        tracing::warn!(employee_id = %hit.employee_id, error = %e, "document lookup failed");
                        Value::Null
                    }
                };
                json!({
                    "score": hit.score,
                    "summary": hit.summary,
                    "employee": employee,
                })
            })
            .collect()
    }

    async fn log_empty_collection(&self, collection: &str) {
        match self.index.describe(collection).await {
            Ok(info) => tracing::info!(
                collection = %collection,
                points = info.points_count,
                "vector search returned no hits"
            ),
            Err(e) => tracing::warn!(collection = %collection, error = %e, "collection probe failed"),
        }
    }
}

#[async_trait]
impl Tool for EmployeeLookupTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Semantic search over employee records. Pass a natural-language `query` describing the employees \
         you need (skills, role, department, location, ...). Returns a JSON array of matches with score, \
         summary and the full employee record."
    }

    fn parameters_schema(&self) -> Value {
        lookup_args_schema()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let args: LookupArgs = serde_json::from_value(Value::Object(args.clone()))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        let limit = self.effective_limit(args.limit);
        Ok(self.lookup(query, limit).await.to_string())
    }
}

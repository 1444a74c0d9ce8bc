//! 向量索引客户端
//!
//! - QdrantIndex：Qdrant REST 接口（search / collection info）
//! - InMemoryVectorIndex：余弦相似度的内存索引，开发与测试用

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::store::{SearchHit, StoreError};

/// 集合概况（零命中时用于诊断）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimension: Option<usize>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 近邻检索，按 score 降序
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn describe(&self, collection: &str) -> Result<CollectionInfo, StoreError>;
}

/// Qdrant REST 客户端
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(String::from),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

impl QdrantPoint {
    fn into_hit(self) -> SearchHit {
        let payload = self.payload.unwrap_or_default();
        let employee_id = ["employee_id", "employeeId"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(value_to_id))
            .or_else(|| value_to_id(&self.id))
            .unwrap_or_default();
        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        SearchHit {
            employee_id,
            score: self.score,
            summary,
        }
    }
}

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", collection),
            )
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": with_payload,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let envelope: QdrantEnvelope<Vec<QdrantPoint>> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(envelope.result.into_iter().map(QdrantPoint::into_hit).collect())
    }

    async fn describe(&self, collection: &str) -> Result<CollectionInfo, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{}", collection))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let envelope: QdrantEnvelope<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let result = envelope.result;
        Ok(CollectionInfo {
            points_count: result["points_count"].as_u64().unwrap_or(0),
            dimension: result["config"]["params"]["vectors"]["size"]
                .as_u64()
                .map(|d| d as usize),
        })
    }
}

#[derive(Debug, Clone)]
struct IndexedPoint {
    employee_id: String,
    summary: String,
    vector: Vec<f32>,
}

/// 内存向量索引（余弦相似度）
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Vec<IndexedPoint>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
    }

    /// 插入或替换一个点（employee_id 相同即替换）
    pub async fn upsert(&self, collection: &str, employee_id: &str, summary: &str, vector: Vec<f32>) {
        let mut collections = self.collections.write().await;
        let points = collections.entry(collection.to_string()).or_default();
        let point = IndexedPoint {
            employee_id: employee_id.to_string(),
            summary: summary.to_string(),
            vector,
        };
        match points.iter_mut().find(|p| p.employee_id == employee_id) {
            Some(existing) => *existing = point,
            None => points.push(point),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let collections = self.collections.read().await;
        let Some(points) = collections.get(collection) else {
            return Err(StoreError::NotFound(format!("collection {}", collection)));
        };
        if let Some(p) = points.iter().find(|p| p.vector.len() != vector.len()) {
            return Err(StoreError::Backend(format!(
                "vector dimension mismatch: expected {}, got {}",
                p.vector.len(),
                vector.len()
            )));
        }

        let mut scored: Vec<(f32, &IndexedPoint)> = points
            .iter()
            .map(|p| (cosine_similarity(vector, &p.vector), p))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, p)| SearchHit {
                employee_id: p.employee_id.clone(),
                score,
                summary: if with_payload { p.summary.clone() } else { String::new() },
            })
            .collect())
    }

    async fn describe(&self, collection: &str) -> Result<CollectionInfo, StoreError> {
        let collections = self.collections.read().await;
        let points = collections
            .get(collection)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", collection)))?;
        Ok(CollectionInfo {
            points_count: points.len() as u64,
            dimension: points.first().map(|p| p.vector.len()),
        })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

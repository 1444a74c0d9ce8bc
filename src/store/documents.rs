//! 员工档案文档库客户端

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;

use crate::store::{EmployeeRecord, StoreError};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 按 employee_id 取档案；不存在返回 None
    async fn find_by_id(
        &self,
        collection: &str,
        employee_id: &str,
    ) -> Result<Option<EmployeeRecord>, StoreError>;
}

/// REST 文档服务：GET {base}/collections/{c}/documents/{id}，返回档案 JSON，不存在时 404。
/// 这是本 crate 自定的约定，需要一层 REST 服务挡在实际文档库前面
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn find_by_id(
        &self,
        collection: &str,
        employee_id: &str,
    ) -> Result<Option<EmployeeRecord>, StoreError> {
        // 逐段追加，id 中的特殊字符由 Url 负责转义
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| StoreError::Backend(format!("invalid document store url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Backend(format!("cannot-be-a-base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["collections", collection, "documents", employee_id]);

        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response
                .json::<EmployeeRecord>()
                .await
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            s => Err(StoreError::Status {
                status: s.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// 内存文档库
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, EmployeeRecord>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, record: EmployeeRecord) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(record.employee_id.clone(), record);
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_id(
        &self,
        collection: &str,
        employee_id: &str,
    ) -> Result<Option<EmployeeRecord>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(employee_id))
            .cloned())
    }
}

//! 外部存储客户端：向量索引、员工档案文档库

pub mod documents;
pub mod employee;
pub mod vector;

pub use documents::{DocumentStore, HttpDocumentStore, InMemoryDocumentStore};
pub use employee::{EmployeeRecord, SearchHit};
pub use vector::{CollectionInfo, InMemoryVectorIndex, QdrantIndex, VectorIndex};

use thiserror::Error;

/// 存储访问错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Backend(String),
}


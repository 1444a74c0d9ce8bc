//! 异步 SQLite 检查点存储（sqlx）
//!
//! 需要启用 `async-sqlite` feature。每次 save 是一条 upsert 语句，
//! 以 (namespace, thread_id) 为主键整体替换快照。

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::memory::{CheckpointError, CheckpointStore, ConversationState};

impl From<sqlx::Error> for CheckpointError {
    fn from(e: sqlx::Error) -> Self {
        CheckpointError::Backend(e.to_string())
    }
}

/// SQLite 检查点存储
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteCheckpointStore {
    /// 打开（不存在则创建）数据库文件
    pub async fn open(
        db_path: impl AsRef<Path>,
        namespace: impl Into<String>,
    ) -> Result<Self, CheckpointError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        Self::connect(&db_url, 5, namespace).await
    }

    /// 按连接串连接；内存库（sqlite::memory:）需 max_connections = 1
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        namespace: impl Into<String>,
    ) -> Result<Self, CheckpointError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(db_url)
            .await?;
        let store = Self {
            pool,
            namespace: namespace.into(),
        };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                namespace TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                state TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, thread_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 已保存快照的版本号（未保存过为 0）
    pub async fn version(&self, thread_id: &str) -> Result<i64, CheckpointError> {
        let row = sqlx::query("SELECT version FROM checkpoints WHERE namespace = ? AND thread_id = ?")
            .bind(&self.namespace)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("version")).unwrap_or(0))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState, CheckpointError> {
        let row = sqlx::query("SELECT state FROM checkpoints WHERE namespace = ? AND thread_id = ?")
            .bind(&self.namespace)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let state: String = r.get("state");
                Ok(serde_json::from_str(&state)?)
            }
            None => Ok(ConversationState::new(thread_id)),
        }
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        let data = serde_json::to_string(state)?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO checkpoints (namespace, thread_id, state, version, updated_at)
             VALUES (?, ?, ?, 1, ?)
             ON CONFLICT(namespace, thread_id) DO UPDATE SET
                state = excluded.state,
                version = checkpoints.version + 1,
                updated_at = excluded.updated_at",
        )
        .bind(&self.namespace)
        .bind(thread_id)
        .bind(&data)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

//! 会话检查点存储抽象层
//!
//! 按 (namespace, thread_id) 保存整份 ConversationState：回合开始时 load，回合结束时 save。
//! save 为整体替换，后续 load 不会观察到写了一半的快照。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::ConversationState;

/// 默认命名空间（多个 Agent 共用同一后端时用于隔离）
pub const DEFAULT_NAMESPACE: &str = "hr-agent";

/// 检查点读写错误
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint encode/decode error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Checkpoint backend error: {0}")]
    Backend(String),
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取线程的最新快照；从未保存过的线程返回空状态
    async fn load(&self, thread_id: &str) -> Result<ConversationState, CheckpointError>;

    /// 原子地写入线程快照（整体替换上一份）
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError>;

    /// 本存储的命名空间
    fn namespace(&self) -> &str;
}

/// 内存检查点存储：进程内有效，适合测试与单机开发
pub struct MemoryCheckpointStore {
    namespace: String,
    snapshots: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryCheckpointStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// 已保存的线程数
    pub async fn thread_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState, CheckpointError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_else(|| ConversationState::new(thread_id)))
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        self.snapshots
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_load_unseen_thread_is_empty() {
        let store = MemoryCheckpointStore::default();
        let state = store.load("new-thread").await.unwrap();
        assert_eq!(state.thread_id, "new-thread");
        assert!(state.is_empty());
        assert_eq!(store.namespace(), DEFAULT_NAMESPACE);
    }

    #[tokio::test]
    async fn test_save_replaces_snapshot() {
        let store = MemoryCheckpointStore::new("test");
        let mut state = ConversationState::new("t1");
        state.push(Message::user("first"));
        store.save("t1", &state).await.unwrap();

        state.push(Message::assistant("answer"));
        store.save("t1", &state).await.unwrap();

        let loaded = store.load("t1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.thread_count().await, 1);
    }
}

//! 文件检查点存储
//!
//! 每个线程一份 JSON 文档：`<root>/<namespace>/<escaped thread id>.json`。
//! 写入先落临时文件再 rename，读者只会看到旧快照或新快照。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{CheckpointError, CheckpointStore, ConversationState};

/// 落盘格式
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    namespace: String,
    thread_id: String,
    /// 保存次数，便于排查
    version: u64,
    updated_at: DateTime<Utc>,
    state: ConversationState,
}

/// JSON 文件检查点存储
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    namespace: String,
}

impl FileCheckpointStore {
    /// root 下按 namespace 建子目录；目录不存在时在首次保存时创建
    pub fn new(root: impl AsRef<Path>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            dir: root.as_ref().join(escape_key(&namespace)),
            namespace,
        }
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(thread_id)))
    }

    async fn read_snapshot(&self, path: &Path) -> Result<Option<SnapshotFile>, CheckpointError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 已保存快照的版本号（未保存过为 0）
    pub async fn version(&self, thread_id: &str) -> Result<u64, CheckpointError> {
        Ok(self
            .read_snapshot(&self.path_for(thread_id))
            .await?
            .map(|s| s.version)
            .unwrap_or(0))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState, CheckpointError> {
        match self.read_snapshot(&self.path_for(thread_id)).await? {
            Some(snapshot) => Ok(snapshot.state),
            None => Ok(ConversationState::new(thread_id)),
        }
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(thread_id);
        let version = self
            .read_snapshot(&path)
            .await
            .ok()
            .flatten()
            .map(|s| s.version)
            .unwrap_or(0)
            + 1;
        let snapshot = SnapshotFile {
            namespace: self.namespace.clone(),
            thread_id: thread_id.to_string(),
            version,
            updated_at: Utc::now(),
            state: state.clone(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", escape_key(thread_id), uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(thread_id = %thread_id, version, bytes = data.len(), "checkpoint saved");
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// 将任意字符串转义为安全文件名：保留 [A-Za-z0-9_-]，其余字节写成 %XX
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[test]
    fn test_escape_key_is_filesystem_safe() {
        assert_eq!(escape_key("thread-1_a"), "thread-1_a");
        assert_eq!(escape_key("../etc"), "%2E%2E%2Fetc");
        assert_eq!(escape_key("a b"), "a%20b");
    }

    #[tokio::test]
    async fn test_round_trip_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), "ns");

        let empty = store.load("t/1").await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(store.version("t/1").await.unwrap(), 0);

        let mut state = ConversationState::new("t/1");
        state.push(Message::user("hello"));
        store.save("t/1", &state).await.unwrap();
        state.push(Message::assistant("hi there"));
        store.save("t/1", &state).await.unwrap();

        let loaded = store.load("t/1").await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.version("t/1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), "ns");
        let mut state = ConversationState::new("t1");
        state.push(Message::user("x"));
        store.save("t1", &state).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("ns"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["t1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileCheckpointStore::new(dir.path(), "a");
        let b = FileCheckpointStore::new(dir.path(), "b");
        let mut state = ConversationState::new("t1");
        state.push(Message::user("only in a"));
        a.save("t1", &state).await.unwrap();

        assert_eq!(a.load("t1").await.unwrap().len(), 1);
        assert!(b.load("t1").await.unwrap().is_empty());
    }
}

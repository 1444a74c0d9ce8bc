//! 记忆层：对话数据模型与检查点持久化（内存 / JSON 文件 / SQLite）

pub mod checkpoint;
pub mod file_store;
pub mod message;
#[cfg(feature = "async-sqlite")]
pub mod sqlite_store;

pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore, DEFAULT_NAMESPACE};
pub use file_store::FileCheckpointStore;
pub use message::{ConversationState, Message, Role, ToolCall};
#[cfg(feature = "async-sqlite")]
pub use sqlite_store::SqliteCheckpointStore;

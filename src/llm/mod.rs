//! LLM 层：工具调用客户端（OpenAI 兼容 / DeepSeek / Mock）与查询嵌入

pub mod deepseek;
pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, deepseek_key_present, DEEPSEEK_CHAT};
pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::{MockEmbedder, MockLlmClient, ScriptStep, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{AssistantReply, LlmClient, LlmError, ToolSpec};

//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：invoke 时传入完整消息与绑定的工具描述，
//! 模型可直接回答，也可返回一个或多个工具调用。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::resilience::RetryableError;
use crate::memory::{Message, ToolCall};

/// 绑定给模型的工具描述（name / description / JSON Schema 参数）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 模型的一次回复：文本与（可选）工具调用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    /// 转为追加到历史中的 assistant 消息
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// 模型调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RetryableError for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => *status >= 500 || *status == 408,
            LlmError::Authentication(_) | LlmError::InvalidResponse(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以 bind-tools 方式调用模型；tools 为空时模型只能直接回答
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<AssistantReply, LlmError>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::RateLimited { retry_after_ms: 1000 }.is_retryable());
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::Authentication("bad key".into()).is_retryable());
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        assert_eq!(
            LlmError::RateLimited { retry_after_ms: 1500 }.retry_after(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(LlmError::RateLimited { retry_after_ms: 0 }.retry_after(), None);
        assert_eq!(LlmError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_reply_into_message() {
        let msg = AssistantReply::text("done").into_message();
        assert_eq!(msg.content, "done");
        assert!(!msg.has_tool_calls());
    }
}

//! Agent 错误类型与对外错误分类
//!
//! AgentError 为内部错误（详细信息只进日志）；ErrorKind 为封闭的对外分类，
//! 携带机器可读 code、默认状态码与固定的用户安全提示。TurnError 是回合失败时返回给调用方的唯一形态。

use thiserror::Error;

use crate::core::resilience::RetryableError;
use crate::llm::LlmError;
use crate::memory::CheckpointError;

/// 对外错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 输入格式 / 长度不合法，不重试
    Validation,
    /// 模型调用重试耗尽或超时
    ModelTimeout,
    /// 工具重试后仍失败（通常以结构化工具结果吸收，不抛给调用方）
    ToolExecution,
    /// 回合级失败：步数超限、检查点读写失败等
    Workflow,
    /// 兜底
    Unexpected,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::ModelTimeout => "MODEL_TIMEOUT",
            ErrorKind::ToolExecution => "TOOL_EXECUTION_ERROR",
            ErrorKind::Workflow => "WORKFLOW_ERROR",
            ErrorKind::Unexpected => "UNEXPECTED_ERROR",
        }
    }

    /// 默认 HTTP 状态码，供传输层映射
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::ModelTimeout => 504,
            ErrorKind::ToolExecution => 502,
            ErrorKind::Workflow | ErrorKind::Unexpected => 500,
        }
    }

    /// 固定的用户安全提示（不含任何内部细节）
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "The request is invalid. Please check your message and try again.",
            ErrorKind::ModelTimeout => {
                "The request timed out. Please try again with a simpler query."
            }
            ErrorKind::ToolExecution => {
                "A lookup tool failed while processing your request. Please try again."
            }
            ErrorKind::Workflow => {
                "The request needed too many steps or could not be completed. Please rephrase your question."
            }
            ErrorKind::Unexpected => "An unexpected error occurred. Please try again later.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Agent 运行过程中的内部错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model timed out after {attempts} attempt(s)")]
    ModelTimeout { attempts: u32 },

    #[error("Tool {tool} failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Recursion limit of {limit} agent/tool round trips exceeded")]
    RecursionLimit { limit: usize },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::ModelTimeout { .. } => ErrorKind::ModelTimeout,
            AgentError::ToolExecution { .. } => ErrorKind::ToolExecution,
            AgentError::RecursionLimit { .. }
            | AgentError::Checkpoint(_)
            | AgentError::Workflow(_)
            | AgentError::Llm(_) => ErrorKind::Workflow,
            AgentError::Config(_) => ErrorKind::Unexpected,
        }
    }
}

impl RetryableError for AgentError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AgentError::Validation(_) | AgentError::RecursionLimit { .. } | AgentError::Config(_)
        )
    }
}

/// 回合失败时返回给调用方的错误：只含分类与用户安全提示
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TurnError {
    kind: ErrorKind,
    message: String,
}

impl TurnError {
    /// 使用该分类的固定提示
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
        }
    }

    /// 校验错误：提示来自用户输入本身，可以原样返回
    pub fn validation(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&AgentError> for TurnError {
    fn from(err: &AgentError) -> Self {
        match err {
            AgentError::Validation(detail) => TurnError::validation(detail.clone()),
            other => TurnError::from_kind(other.kind()),
        }
    }
}

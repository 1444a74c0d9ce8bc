//! 回合输入校验：在任何外部调用之前失败

use crate::core::AgentError;

/// 输入长度限制（按字符计）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub max_message_chars: usize,
    pub max_thread_id_chars: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            max_thread_id_chars: 128,
        }
    }
}

/// 校验 thread_id 与用户消息；message 仅空白也视为空
pub fn validate_turn_input(
    limits: &InputLimits,
    thread_id: &str,
    message: &str,
) -> Result<(), AgentError> {
    if thread_id.trim().is_empty() {
        return Err(AgentError::Validation("threadId must not be empty".into()));
    }
    if thread_id.chars().count() > limits.max_thread_id_chars {
        return Err(AgentError::Validation(format!(
            "threadId must be at most {} characters",
            limits.max_thread_id_chars
        )));
    }
    if message.trim().is_empty() {
        return Err(AgentError::Validation("message must not be empty".into()));
    }
    if message.chars().count() > limits.max_message_chars {
        return Err(AgentError::Validation(format!(
            "message must be at most {} characters",
            limits.max_message_chars
        )));
    }
    Ok(())
}

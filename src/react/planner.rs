//! Planner：Agent 节点的模型调用
//!
//! 拼接 system prompt 与完整历史，以 bind-tools 方式在模型策略下调用 LLM。
//! 调用失败时不向上抛出，由 fallback_reply 生成一条不带工具调用的兜底回复。

use std::sync::Arc;

use crate::core::resilience::{execute, ResilienceError, RetryPolicy};
use crate::core::{AgentError, ErrorKind};
use crate::llm::{AssistantReply, LlmClient, LlmError, ToolSpec};
use crate::memory::Message;
use crate::react::prompt::SystemPrompt;

/// 非超时类模型故障时的兜底回复
pub const MODEL_FAILURE_REPLY: &str =
    "I could not get an answer from the language model right now. Please try again later.";

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompt: SystemPrompt,
    policy: RetryPolicy,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: SystemPrompt, policy: RetryPolicy) -> Self {
        Self { llm, prompt, policy }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// 调用模型；重试耗尽且最后一次为超时时返回 ModelTimeout
    pub async fn plan(
        &self,
        history: &[Message],
        tools: &[ToolSpec],
        tool_names: &[String],
    ) -> Result<AssistantReply, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(self.prompt.render(tool_names)));
        messages.extend_from_slice(history);

        let llm = &self.llm;
        let messages = &messages;
        let result = execute(&self.policy, "model", move || async move {
            llm.invoke(messages, tools).await
        })
        .await;

        result.map_err(|e| match e {
            ResilienceError::TimedOut { attempts, .. }
            | ResilienceError::Exhausted {
                attempts,
                last_error: LlmError::Timeout,
            } => AgentError::ModelTimeout { attempts },
            ResilienceError::Exhausted { last_error, .. } => AgentError::Llm(last_error),
            ResilienceError::Rejected { error, .. } => AgentError::Llm(error),
        })
    }
}

/// 模型失败时写入历史的 assistant 消息
pub fn fallback_reply(err: &AgentError) -> Message {
    match err.kind() {
        ErrorKind::ModelTimeout => Message::assistant(ErrorKind::ModelTimeout.user_message()),
        _ => Message::assistant(MODEL_FAILURE_REPLY),
    }
}

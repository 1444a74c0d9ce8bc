//! 回合入口：校验 → 线程锁 → 回合级弹性执行（load → 追加用户消息 → 状态机）→ 保存检查点 → 返回答案
//!
//! 每次回合尝试都重新读取检查点，失败的尝试不会留下半截状态。对外只返回答案文本或 TurnError，
//! 内部错误细节只写日志。

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::resilience::{execute, ResilienceError, RetryPolicy};
use crate::core::thread_lock::ThreadLocks;
use crate::core::validation::{validate_turn_input, InputLimits};
use crate::core::{AgentError, ErrorKind, TurnError};
use crate::memory::{CheckpointStore, ConversationState, Message, Role};
use crate::react::{fallback_reply, TurnEvent, TurnGraph};

/// 模型返回空文本时的答案
pub const EMPTY_ANSWER_FALLBACK: &str =
    "I'm sorry, I could not produce an answer to that. Please try rephrasing your question.";

pub struct AgentRunner {
    graph: TurnGraph,
    checkpoints: Arc<dyn CheckpointStore>,
    locks: ThreadLocks,
    limits: InputLimits,
    turn_policy: RetryPolicy,
    event_tx: Option<UnboundedSender<TurnEvent>>,
}

impl AgentRunner {
    pub fn new(
        graph: TurnGraph,
        checkpoints: Arc<dyn CheckpointStore>,
        limits: InputLimits,
        turn_policy: RetryPolicy,
    ) -> Self {
        Self {
            graph,
            checkpoints,
            locks: ThreadLocks::new(),
            limits,
            turn_policy,
            event_tx: None,
        }
    }

    /// 过程事件推送（流式调用方或测试）
    pub fn with_event_sender(mut self, tx: UnboundedSender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// 获取模型累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.graph.planner().token_usage()
    }

    /// 执行一个回合，返回助手的最终答案
    pub async fn run_conversation_turn(&self, thread_id: &str, message: &str) -> Result<String, TurnError> {
        if let Err(e) = validate_turn_input(&self.limits, thread_id, message) {
            tracing::warn!(thread_id = %thread_id, kind = %e.kind(), error = %e, "turn rejected");
            return Err(TurnError::from(&e));
        }

        let _guard = self.locks.acquire(thread_id).await;
        let started = Instant::now();
        tracing::info!(
            thread_id = %thread_id,
            model = %self.graph.planner().model_name(),
            chars = message.chars().count(),
            "turn started"
        );

        let outcome = execute(&self.turn_policy, "turn", move || self.attempt(thread_id, message)).await;

        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                let attempts = e.attempts();
                let err = turn_failure(e);
                tracing::error!(
                    thread_id = %thread_id,
                    kind = %err.kind(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "turn failed"
                );
                if err.kind() == ErrorKind::ModelTimeout {
                    self.persist_timeout(thread_id, message, &err).await;
                }
                return Err(TurnError::from(&err));
            }
        };

        if let Err(e) = self.checkpoints.save(thread_id, &state).await {
            let err = AgentError::from(e);
            tracing::error!(thread_id = %thread_id, kind = %err.kind(), error = %err, "checkpoint save failed");
            return Err(TurnError::from(&err));
        }

        tracing::info!(
            thread_id = %thread_id,
            messages = state.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn finished"
        );
        Ok(final_answer(&state))
    }

    /// 与 run_conversation_turn 相同，但失败时返回用户安全提示
    pub async fn respond(&self, thread_id: &str, message: &str) -> String {
        match self.run_conversation_turn(thread_id, message).await {
            Ok(answer) => answer,
            Err(e) => e.message().to_string(),
        }
    }

    async fn attempt(&self, thread_id: &str, message: &str) -> Result<ConversationState, AgentError> {
        let mut state = self.checkpoints.load(thread_id).await?;
        if state.thread_id.is_empty() {
            state.thread_id = thread_id.to_string();
        }
        state.push(Message::user(message));
        self.graph.run(&mut state, self.event_tx.as_ref()).await?;
        ensure_complete(&state)?;
        Ok(state)
    }

    /// 回合级超时：写入用户消息与超时兜底回复，线程下一回合仍可继续
    async fn persist_timeout(&self, thread_id: &str, message: &str, err: &AgentError) {
        let result = async {
            let mut state = self.checkpoints.load(thread_id).await?;
            if state.thread_id.is_empty() {
                state.thread_id = thread_id.to_string();
            }
            state.push(Message::user(message));
            state.push(fallback_reply(err));
            self.checkpoints.save(thread_id, &state).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(thread_id = %thread_id, error = %e, "could not record timeout in checkpoint");
        }
    }
}

fn turn_failure(err: ResilienceError<AgentError>) -> AgentError {
    match err {
        ResilienceError::TimedOut { attempts, .. } => AgentError::ModelTimeout { attempts },
        ResilienceError::Exhausted { last_error, .. } => last_error,
        ResilienceError::Rejected { error, .. } => error,
    }
}

/// 回合结束时最后一条必须是助手回复，且所有工具调用都有结果
fn ensure_complete(state: &ConversationState) -> Result<(), AgentError> {
    if !state.tool_calls_resolved() {
        return Err(AgentError::Workflow("turn ended with unresolved tool calls".into()));
    }
    match state.last() {
        Some(m) if m.role == Role::Assistant && !m.has_tool_calls() => Ok(()),
        _ => Err(AgentError::Workflow("turn ended without an assistant reply".into())),
    }
}

fn final_answer(state: &ConversationState) -> String {
    state
        .last()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.trim())
        .filter(|text| !text.is_empty())
        .map(String::from)
        .unwrap_or_else(|| EMPTY_ANSWER_FALLBACK.to_string())
}

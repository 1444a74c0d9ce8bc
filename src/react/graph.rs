//! 回合状态机：Agent ⇄ Tools
//!
//! Start → Agent；Agent 最新回复带工具调用时 → Tools，否则 → End；Tools 处理完全部待执行调用后 → Agent。
//! Agent↔Tools 往返次数达到上限后若模型仍请求工具，回合以 RecursionLimit 失败，Agent 最多被访问 limit + 1 次。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::AgentError;
use crate::memory::ConversationState;
use crate::react::events::{send_event, TurnEvent};
use crate::react::planner::{fallback_reply, Planner};
use crate::tools::ToolExecutor;

pub const DEFAULT_RECURSION_LIMIT: usize = 5;

const RESULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Agent,
    Tools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(Node),
    End,
}

/// 按当前状态决定下一步
pub fn route(from: Node, state: &ConversationState) -> Transition {
    match from {
        Node::Agent if !state.pending_tool_calls().is_empty() => Transition::To(Node::Tools),
        Node::Agent => Transition::End,
        Node::Tools => Transition::To(Node::Agent),
    }
}

pub struct TurnGraph {
    planner: Planner,
    executor: Arc<ToolExecutor>,
    recursion_limit: usize,
}

impl TurnGraph {
    pub fn new(planner: Planner, executor: Arc<ToolExecutor>, recursion_limit: usize) -> Self {
        Self {
            planner,
            executor,
            recursion_limit,
        }
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// 从 Agent 开始推进，直到 End；新消息直接追加到 state
    pub async fn run(
        &self,
        state: &mut ConversationState,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<(), AgentError> {
        let specs = self.executor.specs();
        let tool_names = self.executor.tool_names();
        let mut round_trips = 0usize;
        let mut node = Node::Agent;

        loop {
            match node {
                Node::Agent => {
                    send_event(event_tx, TurnEvent::AgentVisit { round_trip: round_trips });
                    let message = match self.planner.plan(state.messages(), &specs, &tool_names).await {
                        Ok(reply) => {
                            send_event(
                                event_tx,
                                TurnEvent::ModelReply {
                                    tool_calls: reply.tool_calls.len(),
                                    content_chars: reply.content.chars().count(),
                                },
                            );
                            reply.into_message()
                        }
                        Err(e) => {
                            let attempts = match &e {
                                AgentError::ModelTimeout { attempts } => *attempts,
                                _ => 0,
                            };
                            tracing::warn!(
                                thread_id = %state.thread_id,
                                kind = %e.kind(),
                                error = %e,
                                "model call failed, answering with fallback"
                            );
                            send_event(
                                event_tx,
                                TurnEvent::ModelFallback {
                                    kind: e.kind().code().to_string(),
                                    attempts,
                                },
                            );
                            fallback_reply(&e)
                        }
                    };
                    state.push(message);

                    match route(Node::Agent, state) {
                        Transition::To(next) => {
                            if round_trips >= self.recursion_limit {
                                tracing::warn!(
                                    thread_id = %state.thread_id,
                                    limit = self.recursion_limit,
                                    "recursion limit reached"
                                );
                                return Err(AgentError::RecursionLimit {
                                    limit: self.recursion_limit,
                                });
                            }
                            node = next;
                        }
                        Transition::End => {
                            send_event(event_tx, TurnEvent::Finished { messages: state.len() });
                            return Ok(());
                        }
                    }
                }
                Node::Tools => {
                    let calls = state.pending_tool_calls().to_vec();
                    for call in &calls {
                        send_event(
                            event_tx,
                            TurnEvent::ToolCall {
                                tool: call.name.clone(),
                                call_id: call.id.clone(),
                                args: serde_json::Value::Object(call.arguments.clone()),
                            },
                        );
                        let result = self.executor.resolve(call).await;
                        send_event(
                            event_tx,
                            TurnEvent::ToolResult {
                                tool: call.name.clone(),
                                call_id: call.id.clone(),
                                preview: result.content.chars().take(RESULT_PREVIEW_CHARS).collect(),
                            },
                        );
                        state.push(result);
                    }
                    round_trips += 1;
                    node = match route(Node::Tools, state) {
                        Transition::To(next) => next,
                        Transition::End => return Ok(()),
                    };
                }
            }
        }
    }
}

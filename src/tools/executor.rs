//! 工具执行器
//!
//! 每次工具调用都经过弹性执行（工具策略的超时与重试），并输出一行 JSON 审计日志。
//! resolve 永不失败：未知工具或重试耗尽都转为结构化的 `{"error", "tool"}` 结果，保证每个调用都有对应的 tool 消息。

use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::core::resilience::{execute, ResilienceError, RetryPolicy};
use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::memory::{Message, ToolCall};
use crate::tools::{ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    policy: RetryPolicy,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 在工具策略下执行一次调用；失败映射为 AgentError::ToolExecution
    pub async fn execute(&self, call: &ToolCall) -> Result<String, AgentError> {
        let start = Instant::now();
        let result = match self.registry.get(&call.name) {
            Some(tool) => {
                let context = format!("tool:{}", call.name);
                let args = &call.arguments;
                execute(&self.policy, &context, move || {
                    let tool = tool.clone();
                    async move { tool.execute(args).await }
                })
                .await
                .map_err(|e| AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason: describe_failure(e),
                })
            }
            None => Err(AgentError::ToolExecution {
                tool: call.name.clone(),
                reason: format!("unknown tool {}", call.name),
            }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(_) => "error",
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    /// 执行调用并生成对应的 tool 消息
    pub async fn resolve(&self, call: &ToolCall) -> Message {
        let content = match self.execute(call).await {
            Ok(content) => content,
            Err(AgentError::ToolExecution { tool, reason }) => {
                tracing::warn!(tool = %tool, reason = %reason, "tool call absorbed as error result");
                json!({ "error": reason, "tool": tool }).to_string()
            }
            Err(other) => json!({ "error": other.to_string(), "tool": call.name }).to_string(),
        };
        Message::tool_result(call.id.clone(), content)
    }
}

fn describe_failure(err: ResilienceError<ToolError>) -> String {
    match err {
        ResilienceError::TimedOut { attempts, timeout } => {
            format!("timed out after {} attempt(s) of {:?}", attempts, timeout)
        }
        ResilienceError::Exhausted { attempts, last_error } => {
            format!("failed after {} attempt(s): {}", attempts, last_error)
        }
        ResilienceError::Rejected { error, .. } => error.to_string(),
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

//! 离线 LLM / 嵌入实现（无需 API）
//!
//! - MockLlmClient：收到用户消息时调用绑定的第一个工具，拿到工具结果后给出总结，便于本地跑通整个回合。
//! - ScriptedLlmClient：按脚本依次返回回复、错误或延迟，供测试精确控制模型行为。
//! - MockEmbedder：确定性的哈希词袋向量。

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{AssistantReply, EmbeddingProvider, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCall};

/// Mock 客户端：用户提问 → 工具调用；工具结果 → 文本回答
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<AssistantReply, LlmError> {
        let Some(last) = messages.iter().rev().find(|m| m.role != Role::System) else {
            return Ok(AssistantReply::text("How can I help you with employee records?"));
        };

        match (last.role, tools.first()) {
            (Role::User, Some(tool)) => {
                let mut args = Map::new();
                args.insert("query".into(), Value::String(last.content.clone()));
                Ok(AssistantReply::tool_calls(vec![ToolCall::new(tool.name.clone(), args)]))
            }
            (Role::Tool, _) => Ok(AssistantReply::text(summarize_tool_result(&last.content))),
            _ => Ok(AssistantReply::text(format!("(mock) {}", last.content))),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn summarize_tool_result(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) if items.is_empty() => {
            "I could not find any employees matching that request.".to_string()
        }
        Ok(Value::Array(items)) => {
            let names: Vec<String> = items
                .iter()
                .filter_map(|r| {
                    // 检索结果形如 {score, summary, employee}；employee 可能为 null
                    let employee = r.get("employee")?;
                    let first = employee.get("first_name")?.as_str()?;
                    let last = employee.get("last_name").and_then(Value::as_str).unwrap_or("");
                    Some(format!("{} {}", first, last).trim().to_string())
                })
                .collect();
            if names.is_empty() {
                format!("I found {} matching employee record(s).", items.len())
            } else {
                format!(
                    "I found {} matching employee record(s): {}.",
                    items.len(),
                    names.join(", ")
                )
            }
        }
        Ok(Value::Object(obj)) if obj.contains_key("error") => {
            "The employee lookup failed, so I cannot answer that right now.".to_string()
        }
        _ => "The lookup returned an unexpected result.".to_string(),
    }
}

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(AssistantReply),
    Fail(LlmError),
    /// 等待后再回复（配合超时测试）
    Delayed(Duration, AssistantReply),
}

impl ScriptStep {
    pub fn text(content: &str) -> Self {
        ScriptStep::Reply(AssistantReply::text(content))
    }

    /// 一次 employee_lookup 调用
    pub fn lookup(query: &str) -> Self {
        let mut args = Map::new();
        args.insert("query".into(), Value::String(query.to_string()));
        ScriptStep::Reply(AssistantReply::tool_calls(vec![ToolCall::new(
            "employee_lookup",
            args,
        )]))
    }
}

/// 脚本客户端：依次消费步骤，耗尽后重复 fallback（若有）
pub struct ScriptedLlmClient {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<ScriptStep>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都返回同一步
    pub fn repeating(step: ScriptStep) -> Self {
        Self::new(Vec::new()).with_fallback(step)
    }

    pub fn with_fallback(mut self, step: ScriptStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// 累计调用次数（包括超时被丢弃的尝试）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用时看到的完整消息列表
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let queued = self.steps.lock().ok().and_then(|mut q| q.pop_front());
        queued.or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<AssistantReply, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        match self.next_step() {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::Delayed(wait, reply)) => {
                tokio::time::sleep(wait).await;
                Ok(reply)
            }
            None => Err(LlmError::InvalidResponse("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 确定性嵌入：小写词哈希到固定维度后 L2 归一化；共享词越多余弦越高
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dims: usize,
    fail: bool,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            fail: false,
        }
    }

    /// 每次 embed 都失败
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h = DefaultHasher::new();
            word.to_lowercase().hash(&mut h);
            v[(h.finish() % self.dims as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        if self.fail {
            return Err("mock embedder configured to fail".to_string());
        }
        if text.trim().is_empty() {
            return Err("cannot embed empty text".to_string());
        }
        Ok(self.embed_text(text))
    }

    fn model_name(&self) -> &str {
        "mock-hash"
    }
}

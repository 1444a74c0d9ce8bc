//! OpenAI 兼容 Chat Completions 客户端（工具调用）
//!
//! 直接走 `/chat/completions` 线协议：请求携带 tools（function 定义），
//! 响应中的 tool_calls 解析为 ToolCall。base_url 可配置，DeepSeek、OpenAI、自建代理均可。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::llm::{AssistantReply, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 HTTP Client、端点、模型名与温度
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            temperature: 0.0,
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<_>>(),
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Message -> API 格式
fn to_wire_message(m: &Message) -> Value {
    let mut json = json!({
        "role": m.role.as_str(),
        "content": m.content,
    });
    if !m.tool_calls.is_empty() {
        json["tool_calls"] = Value::Array(
            m.tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": Value::Object(c.arguments.clone()).to_string(),
                        }
                    })
                })
                .collect(),
        );
        if m.content.is_empty() {
            json["content"] = Value::Null;
        }
    }
    if let Some(id) = &m.tool_call_id {
        json["tool_call_id"] = json!(id);
    }
    json
}

/// API tool_call -> ToolCall；arguments 为 JSON 字符串，非对象时包成 {"input": ...}
fn from_wire_tool_call(call: WireToolCall) -> Result<ToolCall, LlmError> {
    let arguments = match serde_json::from_str::<Value>(&call.function.arguments) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Map::new(),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("input".into(), other);
            map
        }
        Err(_) if call.function.arguments.trim().is_empty() => Map::new(),
        Err(e) => {
            return Err(LlmError::InvalidResponse(format!(
                "tool call arguments for {} are not JSON: {}",
                call.function.name, e
            )))
        }
    };
    let tc = ToolCall::new(call.function.name, arguments);
    Ok(match call.id {
        Some(id) if !id.is_empty() => tc.with_id(id),
        _ => tc,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<AssistantReply, LlmError> {
        let body = self.request_body(messages, tools);
        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(1000);
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => LlmError::RateLimited { retry_after_ms },
                401 | 403 => LlmError::Authentication(text),
                code => LlmError::Api { status: code, body: text },
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let message = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?
            .message;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_tool_call)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AssistantReply {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_message_for_tool_round_trip() {
        let mut args = Map::new();
        args.insert("query".into(), json!("Python skills"));
        let call = ToolCall::new("employee_lookup", args).with_id("call_1");
        let assistant = to_wire_message(&Message::assistant_with_tools("", vec![call]));
        assert_eq!(assistant["role"], "assistant");
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"Python skills"}"#
        );

        let tool = to_wire_message(&Message::tool_result("call_1", "[]"));
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "employee_lookup", "arguments": "{\"query\":\"Java\",\"limit\":5}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        });
        let parsed: WireResponse = serde_json::from_value(raw).unwrap();
        let call = parsed
            .choices
            .into_iter()
            .next()
            .unwrap()
            .message
            .tool_calls
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        let tc = from_wire_tool_call(call).unwrap();
        assert_eq!(tc.id, "call_abc");
        assert_eq!(tc.arguments["query"], "Java");
        assert_eq!(tc.arguments["limit"], 5);
    }

    #[test]
    fn test_tools_bound_in_request_body() {
        let client = OpenAiClient::new(Some("http://localhost:9/v1/"), "gpt-4o-mini", Some("sk-test"));
        let spec = ToolSpec {
            name: "employee_lookup".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        };
        let body = client.request_body(&[Message::user("hi")], &[spec]);
        assert_eq!(body["tools"][0]["function"]["name"], "employee_lookup");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(client.base_url, "http://localhost:9/v1");

        let plain = client.request_body(&[Message::user("hi")], &[]);
        assert!(plain.get("tools").is_none());
    }

    #[test]
    fn test_non_json_arguments_rejected() {
        let call = WireToolCall {
            id: None,
            function: WireFunction {
                name: "employee_lookup".into(),
                arguments: "{not json".into(),
            },
        };
        assert!(matches!(from_wire_tool_call(call), Err(LlmError::InvalidResponse(_))));
    }
}

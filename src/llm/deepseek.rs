//! DeepSeek 端点（OpenAI 兼容，支持 function calling）
//!
//! - Base URL: https://api.deepseek.com
//! - 工具调用只用 deepseek-chat；deepseek-reasoner 不支持 tools

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端
///
/// Key 优先取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`；base_url 未配置时使用官方地址。
pub fn create_deepseek_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    OpenAiClient::new(
        Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)),
        model.unwrap_or(DEEPSEEK_CHAT),
        api_key.as_deref(),
    )
}

/// 是否配置了 DeepSeek 或 OpenAI 的 Key
pub fn deepseek_key_present() -> bool {
    ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).map(|v| !v.trim().is_empty()).unwrap_or(false))
}

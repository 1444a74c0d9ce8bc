//! System prompt：角色说明 + 可用工具 + 当前 UTC 时间，每次调用模型时重新渲染

use std::path::Path;

use chrono::{DateTime, Utc};

/// 默认模板；`{tools}` 与 `{now}` 在渲染时替换
pub const DEFAULT_TEMPLATE: &str = "You are a helpful HR assistant that answers questions about employee records.\n\
Use the provided tools to search the employee records whenever a question needs data; \
never invent employees or details that are not present in tool results.\n\
If a tool returns an error or no matches, say so plainly.\n\
You have access to the following tools: {tools}.\n\
Current time: {now}.";

#[derive(Debug, Clone)]
pub struct SystemPrompt {
    template: String,
}

impl SystemPrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// 从文件读取模板；文件不存在或为空时使用默认模板
    pub fn from_file_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Self::new(text),
            Ok(_) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "system prompt file unreadable, using default");
                Self::default()
            }
        }
    }

    pub fn render(&self, tool_names: &[String]) -> String {
        self.render_at(tool_names, Utc::now())
    }

    pub fn render_at(&self, tool_names: &[String], now: DateTime<Utc>) -> String {
        let tools = if tool_names.is_empty() {
            "(none)".to_string()
        } else {
            tool_names.join(", ")
        };
        self.template
            .replace("{tools}", &tools)
            .replace("{now}", &now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HR_AGENT__*` 覆盖（双下划线表示嵌套，如 `HR_AGENT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::resilience::RetryPolicy;
use crate::core::InputLimits;
use crate::memory::DEFAULT_NAMESPACE;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub vector: VectorSection,
    pub documents: DocumentsSection,
    pub checkpoint: CheckpointSection,
    pub agent: AgentSection,
    pub resilience: ResilienceSection,
}

/// [app] 段：应用名、输入长度限制、system prompt 模板路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub max_message_chars: usize,
    pub max_thread_id_chars: usize,
    /// 未设置或文件不存在时用内置模板
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        let limits = InputLimits::default();
        Self {
            name: "hr-agent".to_string(),
            max_message_chars: limits.max_message_chars,
            max_thread_id_chars: limits.max_thread_id_chars,
            system_prompt_path: None,
        }
    }
}

impl AppSection {
    pub fn input_limits(&self) -> InputLimits {
        InputLimits {
            max_message_chars: self.max_message_chars,
            max_thread_id_chars: self.max_thread_id_chars,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / mock；没有 API Key 时一律回退到 mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            temperature: 0.0,
        }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    pub base_url: Option<String>,
    /// 离线嵌入的维度（无 API Key 时使用）
    pub offline_dims: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: crate::llm::embedding::DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: None,
            offline_dims: 64,
        }
    }
}

/// [vector] 段：qdrant / memory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub backend: String,
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "http://localhost:6333".to_string(),
            collection: "employees".to_string(),
            api_key: None,
        }
    }
}

/// [documents] 段：http / memory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsSection {
    pub backend: String,
    pub url: String,
    pub collection: String,
}

impl Default for DocumentsSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "http://localhost:8080".to_string(),
            collection: "employees".to_string(),
        }
    }
}

/// [checkpoint] 段：memory / file / sqlite
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: String,
    /// file：根目录；sqlite：数据库文件
    pub path: PathBuf,
    pub namespace: String,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: PathBuf::from("data/checkpoints"),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// [agent] 段：步数上限与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub recursion_limit: usize,
    pub lookup_limit: usize,
    pub max_lookup_limit: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            recursion_limit: crate::react::DEFAULT_RECURSION_LIMIT,
            lookup_limit: 100,
            max_lookup_limit: 100,
        }
    }
}

/// 单个重试策略的覆盖项；未出现的键沿用该调用类型的默认策略
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub factor: Option<f64>,
    pub min_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl PolicyOverrides {
    pub fn apply(&self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            timeout: self.timeout_ms.map(Duration::from_millis).unwrap_or(base.timeout),
            factor: self.factor.unwrap_or(base.factor),
            min_backoff: self
                .min_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(base.min_backoff),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(base.max_backoff),
        }
    }
}

/// [resilience.model] / [resilience.turn] / [resilience.tool]，单位毫秒
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceSection {
    pub model: PolicyOverrides,
    pub turn: PolicyOverrides,
    pub tool: PolicyOverrides,
}

impl ResilienceSection {
    pub fn model_policy(&self) -> RetryPolicy {
        self.model.apply(RetryPolicy::for_model())
    }

    pub fn turn_policy(&self) -> RetryPolicy {
        self.turn.apply(RetryPolicy::for_turn())
    }

    pub fn tool_policy(&self) -> RetryPolicy {
        self.tool.apply(RetryPolicy::for_tool())
    }
}

/// 加载配置，环境变量 HR_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HR_AGENT__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HR_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

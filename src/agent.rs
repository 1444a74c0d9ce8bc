//! Agent 装配
//!
//! 按配置构建一次外部服务句柄（模型、嵌入、向量索引、文档库、检查点存储），
//! 再组装成 AgentRunner。句柄以 Arc 共享给所有回合，没有全局单例。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentRunner};
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, deepseek_key_present, EmbeddingProvider,
    LlmClient, MockEmbedder, MockLlmClient, OpenAiClient,
};
use crate::memory::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::react::{Planner, SystemPrompt, TurnGraph};
use crate::store::{
    DocumentStore, HttpDocumentStore, InMemoryDocumentStore, InMemoryVectorIndex, QdrantIndex,
    VectorIndex,
};
use crate::tools::{EmployeeLookupTool, LookupSettings, ToolExecutor, ToolRegistry};

/// 回合依赖的外部服务
#[derive(Clone)]
pub struct AgentServices {
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub documents: Arc<dyn DocumentStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// 从配置构建全部服务并组装 AgentRunner
pub async fn build_runner(cfg: &AppConfig) -> Result<AgentRunner, AgentError> {
    let services = build_services(cfg).await?;
    Ok(assemble_runner(cfg, services))
}

pub async fn build_services(cfg: &AppConfig) -> Result<AgentServices, AgentError> {
    Ok(AgentServices {
        llm: create_llm_from_config(cfg),
        embedder: create_embedder(cfg),
        index: create_vector_index(cfg).await?,
        documents: create_document_store(cfg)?,
        checkpoints: create_checkpoint_store(cfg).await?,
    })
}

/// 用给定服务组装 Runner（测试可注入脚本模型与内存存储）
pub fn assemble_runner(cfg: &AppConfig, services: AgentServices) -> AgentRunner {
    let lookup = EmployeeLookupTool::new(
        services.embedder,
        services.index,
        services.documents,
        LookupSettings {
            vector_collection: cfg.vector.collection.clone(),
            document_collection: cfg.documents.collection.clone(),
            default_limit: cfg.agent.lookup_limit,
            max_limit: cfg.agent.max_lookup_limit,
        },
    );
    let mut tools = ToolRegistry::new();
    tools.register(lookup);
    let executor = Arc::new(ToolExecutor::new(tools, cfg.resilience.tool_policy()));

    let prompt = SystemPrompt::from_file_or_default(cfg.app.system_prompt_path.as_deref());
    let planner = Planner::new(services.llm, prompt, cfg.resilience.model_policy());
    let graph = TurnGraph::new(planner, executor, cfg.agent.recursion_limit);

    AgentRunner::new(
        graph,
        services.checkpoints,
        cfg.app.input_limits(),
        cfg.resilience.turn_policy(),
    )
}

/// 选择模型后端；没有可用 Key 时回退到 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let openai_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());

    match provider.as_str() {
        "deepseek" if deepseek_key_present() => {
            let client = create_deepseek_client(cfg.llm.model.as_deref(), cfg.llm.base_url.as_deref())
                .with_temperature(cfg.llm.temperature);
            tracing::info!(model = %client.model_name(), "using DeepSeek LLM");
            Arc::new(client)
        }
        "openai" if openai_key.is_some() => {
            let model = cfg.llm.model.as_deref().unwrap_or("gpt-4o-mini");
            tracing::info!(model = %model, "using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), model, openai_key.as_deref())
                    .with_temperature(cfg.llm.temperature),
            )
        }
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!(provider = %other, "no API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

fn create_embedder(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    if cfg.llm.provider.eq_ignore_ascii_case("mock") {
        return Arc::new(MockEmbedder::new(cfg.embedding.offline_dims));
    }
    create_embedder_from_config(cfg.embedding.base_url.as_deref(), &cfg.embedding.model, None)
        .unwrap_or_else(|| {
            tracing::warn!("using offline hash embeddings");
            Arc::new(MockEmbedder::new(cfg.embedding.offline_dims))
        })
}

async fn create_vector_index(cfg: &AppConfig) -> Result<Arc<dyn VectorIndex>, AgentError> {
    match cfg.vector.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(
            &cfg.vector.url,
            cfg.vector.api_key.as_deref(),
        ))),
        "memory" => {
            let index = InMemoryVectorIndex::new();
            index.create_collection(&cfg.vector.collection).await;
            Ok(Arc::new(index))
        }
        other => Err(AgentError::Config(format!("unknown vector backend: {}", other))),
    }
}

fn create_document_store(cfg: &AppConfig) -> Result<Arc<dyn DocumentStore>, AgentError> {
    match cfg.documents.backend.as_str() {
        "http" => Ok(Arc::new(HttpDocumentStore::new(&cfg.documents.url))),
        "memory" => Ok(Arc::new(InMemoryDocumentStore::new())),
        other => Err(AgentError::Config(format!("unknown documents backend: {}", other))),
    }
}

async fn create_checkpoint_store(cfg: &AppConfig) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    let ns = cfg.checkpoint.namespace.as_str();
    match cfg.checkpoint.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCheckpointStore::new(ns))),
        "file" => Ok(Arc::new(FileCheckpointStore::new(&cfg.checkpoint.path, ns))),
        #[cfg(feature = "async-sqlite")]
        "sqlite" => Ok(Arc::new(
            crate::memory::SqliteCheckpointStore::open(&cfg.checkpoint.path, ns).await?,
        )),
        #[cfg(not(feature = "async-sqlite"))]
        "sqlite" => Err(AgentError::Config(
            "sqlite checkpoints require the async-sqlite feature".into(),
        )),
        other => Err(AgentError::Config(format!("unknown checkpoint backend: {}", other))),
    }
}

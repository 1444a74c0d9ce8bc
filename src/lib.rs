//! HR Agent - 员工档案对话 Agent
//!
//! 模块划分：
//! - **agent**: 按配置装配外部服务与 AgentRunner
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、弹性执行、输入校验、线程锁、回合入口
//! - **llm**: 工具调用 LLM 客户端（OpenAI 兼容 / DeepSeek / Mock）与查询嵌入
//! - **memory**: 对话数据模型与检查点存储（内存 / 文件 / SQLite）
//! - **react**: Agent ⇄ Tools 状态机、模型调用与 system prompt
//! - **store**: 向量索引与员工档案文档库客户端
//! - **tools**: 工具注册表、执行器与员工语义检索工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod store;
pub mod tools;

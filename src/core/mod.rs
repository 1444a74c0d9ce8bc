//! 核心编排层：错误分类、弹性执行、输入校验、线程锁与回合入口

pub mod error;
pub mod resilience;
pub mod runner;
pub mod thread_lock;
pub mod validation;

pub use error::{AgentError, ErrorKind, TurnError};
pub use resilience::{execute, ResilienceError, RetryPolicy, RetryableError};
pub use runner::{AgentRunner, EMPTY_ANSWER_FALLBACK};
pub use thread_lock::ThreadLocks;
pub use validation::{validate_turn_input, InputLimits};

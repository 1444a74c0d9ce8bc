//! 回合编排：状态机（graph）、模型调用（planner）、system prompt 与过程事件

pub mod events;
pub mod graph;
pub mod planner;
pub mod prompt;

pub use events::TurnEvent;
pub use graph::{route, Node, Transition, TurnGraph, DEFAULT_RECURSION_LIMIT};
pub use planner::{fallback_reply, Planner, MODEL_FAILURE_REPLY};
pub use prompt::SystemPrompt;

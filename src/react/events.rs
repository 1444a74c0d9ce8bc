//! 回合过程事件：节点访问、模型回复、工具调用与结果，可序列化为 JSON 推送给流式调用方

use serde::Serialize;

/// 单步过程事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 进入 Agent 节点（round_trip 为已完成的 Agent↔Tools 往返次数）
    AgentVisit { round_trip: usize },
    /// 模型回复；tool_calls 为请求的工具调用数
    ModelReply { tool_calls: usize, content_chars: usize },
    /// 模型调用失败，已写入兜底回复
    ModelFallback { kind: String, attempts: u32 },
    ToolCall {
        tool: String,
        call_id: String,
        args: serde_json::Value,
    },
    /// 工具结果（预览，避免过长）
    ToolResult {
        tool: String,
        call_id: String,
        preview: String,
    },
    /// 回合结束（messages 为结束时的历史长度）
    Finished { messages: usize },
}

pub(crate) fn send_event(tx: Option<&tokio::sync::mpsc::UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

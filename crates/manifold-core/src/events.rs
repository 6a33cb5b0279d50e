//! Internal execution events and the external wire vocabulary.
//!
//! [`ExecutionEvent`]s are produced by roles while they run and travel over
//! the execution bus. The translator turns them into [`ExternalEvent`]s, the
//! only shape a consumer ever sees.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::team::RoleId;

/// Lifecycle signal emitted during a role turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    pub role: RoleId,
    /// 1-based turn counter within the run.
    pub step: u32,
    pub kind: ExecutionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEventKind {
    RoleEnter,
    RoleExit,
    GenerationStart {
        message_id: String,
    },
    GenerationChunk {
        message_id: String,
        text: String,
        reasoning: Option<String>,
    },
    GenerationEnd {
        message_id: String,
    },
    CapabilityStart {
        call_id: String,
        name: String,
        input: Value,
    },
    CapabilityEnd {
        call_id: String,
        name: String,
        output: String,
    },
}

/// Incremental message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDelta {
    #[serde(rename = "content")]
    Content(String),
    #[serde(rename = "reasoning_content")]
    Reasoning(String),
}

/// Normalized event delivered to the consumer, one per stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ExternalEvent {
    #[serde(rename = "start_of_workflow")]
    WorkflowStart {
        workflow_id: String,
        input: Vec<Message>,
    },
    #[serde(rename = "start_of_agent")]
    AgentStart { agent_name: String, agent_id: String },
    #[serde(rename = "end_of_agent")]
    AgentEnd { agent_name: String, agent_id: String },
    #[serde(rename = "start_of_llm")]
    LlmStart { agent_name: String },
    #[serde(rename = "end_of_llm")]
    LlmEnd { agent_name: String },
    #[serde(rename = "message")]
    Message {
        message_id: String,
        delta: MessageDelta,
    },
    #[serde(rename = "tool_call")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        tool_input: Value,
    },
    #[serde(rename = "tool_call_result")]
    ToolCallResult {
        tool_call_id: String,
        tool_name: String,
        tool_result: String,
    },
    #[serde(rename = "end_of_workflow")]
    WorkflowEnd {
        workflow_id: String,
        messages: Vec<Message>,
    },
    #[serde(rename = "error")]
    Error {
        workflow_id: String,
        kind: String,
        message: String,
    },
}

impl ExternalEvent {
    /// Wire name of the event (the SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            ExternalEvent::WorkflowStart { .. } => "start_of_workflow",
            ExternalEvent::AgentStart { .. } => "start_of_agent",
            ExternalEvent::AgentEnd { .. } => "end_of_agent",
            ExternalEvent::LlmStart { .. } => "start_of_llm",
            ExternalEvent::LlmEnd { .. } => "end_of_llm",
            ExternalEvent::Message { .. } => "message",
            ExternalEvent::ToolCall { .. } => "tool_call",
            ExternalEvent::ToolCallResult { .. } => "tool_call_result",
            ExternalEvent::WorkflowEnd { .. } => "end_of_workflow",
            ExternalEvent::Error { .. } => "error",
        }
    }

    /// JSON payload of the event (the SSE `data:` field).
    pub fn data(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(Value::take))
            .unwrap_or_default()
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalEvent::WorkflowEnd { .. } | ExternalEvent::Error { .. }
        )
    }
}

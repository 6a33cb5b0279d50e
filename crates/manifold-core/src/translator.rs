//! Translate execution events into the external wire vocabulary.
//!
//! Only streamed roles (intake, planner and team members) are visible to the
//! consumer; the dispatcher works silently. Visible intake text passes
//! through a per-run [`TokenBuffer`] so the handoff marker is never sent.

use std::sync::Arc;

use tracing::trace;

use crate::events::{ExecutionEvent, ExecutionEventKind, ExternalEvent, MessageDelta};
use crate::message::Message;
use crate::team::{RoleId, Team};
use crate::token_buffer::TokenBuffer;

/// Stateful filter owned by one run.
#[derive(Debug)]
pub struct EventTranslator {
    run_id: String,
    team: Arc<Team>,
    input: Vec<Message>,
    workflow_started: bool,
    intake_buffer: TokenBuffer,
}

impl EventTranslator {
    pub fn new(run_id: impl Into<String>, team: Arc<Team>, input: Vec<Message>) -> Self {
        Self {
            run_id: run_id.into(),
            team,
            input,
            workflow_started: false,
            intake_buffer: TokenBuffer::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether `role` streams its progress to the consumer.
    pub fn is_streamed(&self, role: &RoleId) -> bool {
        matches!(role, RoleId::Intake | RoleId::Planner) || self.team.contains(role)
    }

    /// Map one execution event to zero or more external events.
    pub fn translate(&mut self, event: ExecutionEvent) -> Vec<ExternalEvent> {
        if !self.is_streamed(&event.role) {
            trace!(role = %event.role, "dropping event from silent role");
            return Vec::new();
        }
        let agent_name = event.role.name().to_string();

        match event.kind {
            ExecutionEventKind::RoleEnter => {
                let mut out = Vec::with_capacity(2);
                if event.role == RoleId::Planner && !self.workflow_started {
                    self.workflow_started = true;
                    out.push(ExternalEvent::WorkflowStart {
                        workflow_id: self.run_id.clone(),
                        input: self.input.clone(),
                    });
                }
                out.push(ExternalEvent::AgentStart {
                    agent_id: self.agent_id(&agent_name, event.step),
                    agent_name,
                });
                out
            }
            ExecutionEventKind::RoleExit => vec![ExternalEvent::AgentEnd {
                agent_id: self.agent_id(&agent_name, event.step),
                agent_name,
            }],
            ExecutionEventKind::GenerationStart { .. } => {
                vec![ExternalEvent::LlmStart { agent_name }]
            }
            ExecutionEventKind::GenerationEnd { message_id } => {
                let mut out = Vec::with_capacity(2);
                if event.role == RoleId::Intake {
                    if let Some(text) = self.intake_buffer.drain() {
                        out.push(content(message_id, text));
                    }
                }
                out.push(ExternalEvent::LlmEnd { agent_name });
                out
            }
            ExecutionEventKind::GenerationChunk {
                message_id,
                text,
                reasoning,
            } => {
                if !text.is_empty() {
                    if event.role == RoleId::Intake {
                        self.intake_buffer
                            .push(&text)
                            .map(|t| content(message_id, t))
                            .into_iter()
                            .collect()
                    } else {
                        vec![content(message_id, text)]
                    }
                } else {
                    reasoning
                        .filter(|r| !r.is_empty())
                        .map(|r| ExternalEvent::Message {
                            message_id,
                            delta: MessageDelta::Reasoning(r),
                        })
                        .into_iter()
                        .collect()
                }
            }
            ExecutionEventKind::CapabilityStart {
                call_id,
                name,
                input,
            } if event.role.is_executor() => vec![ExternalEvent::ToolCall {
                tool_call_id: self.tool_call_id(&agent_name, &name, &call_id),
                tool_name: name,
                tool_input: input,
            }],
            ExecutionEventKind::CapabilityEnd {
                call_id,
                name,
                output,
            } if event.role.is_executor() => vec![ExternalEvent::ToolCallResult {
                tool_call_id: self.tool_call_id(&agent_name, &name, &call_id),
                tool_name: name,
                tool_result: output,
            }],
            ExecutionEventKind::CapabilityStart { .. } | ExecutionEventKind::CapabilityEnd { .. } => {
                Vec::new()
            }
        }
    }

    fn agent_id(&self, agent_name: &str, step: u32) -> String {
        format!("{}_{}_{}", self.run_id, agent_name, step)
    }

    fn tool_call_id(&self, agent_name: &str, capability: &str, call_id: &str) -> String {
        format!("{}_{}_{}_{}", self.run_id, agent_name, capability, call_id)
    }
}

fn content(message_id: String, text: String) -> ExternalEvent {
    ExternalEvent::Message {
        message_id,
        delta: MessageDelta::Content(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translator() -> EventTranslator {
        EventTranslator::new("run1", Arc::new(Team::standard()), vec![Message::user("q")])
    }

    fn event(role: RoleId, step: u32, kind: ExecutionEventKind) -> ExecutionEvent {
        ExecutionEvent { role, step, kind }
    }

    fn chunk(text: &str) -> ExecutionEventKind {
        ExecutionEventKind::GenerationChunk {
            message_id: "m".into(),
            text: text.into(),
            reasoning: None,
        }
    }

    fn contents(events: &[ExternalEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ExternalEvent::Message {
                    delta: MessageDelta::Content(c),
                    ..
                } => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    fn run_intake(t: &mut EventTranslator, chunks: &[&str]) -> Vec<ExternalEvent> {
        let mut out = Vec::new();
        out.extend(t.translate(event(RoleId::Intake, 1, ExecutionEventKind::RoleEnter)));
        out.extend(t.translate(event(
            RoleId::Intake,
            1,
            ExecutionEventKind::GenerationStart { message_id: "m".into() },
        )));
        for c in chunks {
            out.extend(t.translate(event(RoleId::Intake, 1, chunk(c))));
        }
        out.extend(t.translate(event(
            RoleId::Intake,
            1,
            ExecutionEventKind::GenerationEnd { message_id: "m".into() },
        )));
        out.extend(t.translate(event(RoleId::Intake, 1, ExecutionEventKind::RoleExit)));
        out
    }

    #[test]
    fn test_intake_handoff_marker_never_leaks() {
        let mut t = translator();
        let out = run_intake(&mut t, &["han", "doff:x", "more"]);
        assert!(contents(&out).is_empty());
        let names: Vec<_> = out.iter().map(ExternalEvent::name).collect();
        assert_eq!(
            names,
            vec!["start_of_agent", "start_of_llm", "end_of_llm", "end_of_agent"]
        );
    }

    #[test]
    fn test_intake_reply_flushes_then_streams() {
        let mut t = translator();
        let out = run_intake(&mut t, &["hel", "lo world", "!"]);
        assert_eq!(contents(&out), vec!["hello world", "!"]);
    }

    #[test]
    fn test_short_intake_reply_released_before_llm_end() {
        let mut t = translator();
        let out = run_intake(&mut t, &["Hi there!"]);
        let names: Vec<_> = out.iter().map(ExternalEvent::name).collect();
        assert_eq!(
            names,
            vec!["start_of_agent", "start_of_llm", "message", "end_of_llm", "end_of_agent"]
        );
        assert_eq!(contents(&out), vec!["Hi there!"]);
    }

    #[test]
    fn test_planner_enter_starts_workflow_once() {
        let mut t = translator();
        let first = t.translate(event(RoleId::Planner, 2, ExecutionEventKind::RoleEnter));
        assert_eq!(first.len(), 2);
        assert_eq!(
            first[0],
            ExternalEvent::WorkflowStart {
                workflow_id: "run1".into(),
                input: vec![Message::user("q")],
            }
        );
        assert_eq!(
            first[1],
            ExternalEvent::AgentStart {
                agent_name: "planner".into(),
                agent_id: "run1_planner_2".into(),
            }
        );

        let again = t.translate(event(RoleId::Planner, 9, ExecutionEventKind::RoleEnter));
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_dispatcher_is_silent() {
        let mut t = translator();
        for kind in [
            ExecutionEventKind::RoleEnter,
            ExecutionEventKind::GenerationStart { message_id: "m".into() },
            chunk("{\"next\": \"coder\"}"),
            ExecutionEventKind::GenerationChunk {
                message_id: "m".into(),
                text: String::new(),
                reasoning: Some("pick the coder".into()),
            },
            ExecutionEventKind::RoleExit,
        ] {
            assert!(t.translate(event(RoleId::Dispatcher, 3, kind)).is_empty());
        }
    }

    #[test]
    fn test_non_intake_chunks_stream_immediately() {
        let mut t = translator();
        let out = t.translate(event(RoleId::Executor("coder".into()), 4, chunk("handoff")));
        assert_eq!(contents(&out), vec!["handoff"]);
    }

    #[test]
    fn test_empty_chunk_suppressed_and_reasoning_forwarded() {
        let mut t = translator();
        let role = RoleId::Planner;
        assert!(t.translate(event(role.clone(), 2, chunk(""))).is_empty());

        let out = t.translate(event(
            role,
            2,
            ExecutionEventKind::GenerationChunk {
                message_id: "m".into(),
                text: String::new(),
                reasoning: Some("thinking".into()),
            },
        ));
        assert_eq!(
            out,
            vec![ExternalEvent::Message {
                message_id: "m".into(),
                delta: MessageDelta::Reasoning("thinking".into()),
            }]
        );
    }

    #[test]
    fn test_capability_events_only_for_executors() {
        let mut t = translator();
        let start = ExecutionEventKind::CapabilityStart {
            call_id: "c1".into(),
            name: "web_search".into(),
            input: json!({"query": "rust"}),
        };
        assert!(t.translate(event(RoleId::Planner, 2, start.clone())).is_empty());

        let out = t.translate(event(RoleId::Executor("researcher".into()), 4, start));
        assert_eq!(
            out,
            vec![ExternalEvent::ToolCall {
                tool_call_id: "run1_researcher_web_search_c1".into(),
                tool_name: "web_search".into(),
                tool_input: json!({"query": "rust"}),
            }]
        );

        let end = t.translate(event(
            RoleId::Executor("researcher".into()),
            4,
            ExecutionEventKind::CapabilityEnd {
                call_id: "c1".into(),
                name: "web_search".into(),
                output: "[]".into(),
            },
        ));
        assert!(matches!(
            &end[0],
            ExternalEvent::ToolCallResult { tool_call_id, tool_result, .. }
                if tool_call_id == "run1_researcher_web_search_c1" && tool_result == "[]"
        ));
    }

    #[test]
    fn test_reporter_is_streamed() {
        let mut t = translator();
        let out = t.translate(event(RoleId::Reporter, 7, ExecutionEventKind::RoleExit));
        assert_eq!(
            out,
            vec![ExternalEvent::AgentEnd {
                agent_name: "reporter".into(),
                agent_id: "run1_reporter_7".into(),
            }]
        );
    }

    #[test]
    fn test_intake_reasoning_does_not_fill_buffer() {
        let mut t = translator();
        let reasoning = |r: &str| ExecutionEventKind::GenerationChunk {
            message_id: "m".into(),
            text: String::new(),
            reasoning: Some(r.into()),
        };
        assert!(t.translate(event(RoleId::Intake, 1, chunk("Hi"))).is_empty());
        let out = t.translate(event(RoleId::Intake, 1, reasoning("polite")));
        assert_eq!(
            out,
            vec![ExternalEvent::Message {
                message_id: "m".into(),
                delta: MessageDelta::Reasoning("polite".into()),
            }]
        );
        let out = t.translate(event(RoleId::Intake, 1, chunk(" there")));
        assert_eq!(contents(&out), vec!["Hi there"]);
    }

    #[test]
    fn test_buffers_are_isolated_per_run() {
        let mut a = translator();
        let mut b = translator();
        a.translate(event(RoleId::Intake, 1, chunk("hand")));
        let out = b.translate(event(RoleId::Intake, 1, chunk("hel")));
        assert!(out.is_empty());
        let out = b.translate(event(RoleId::Intake, 1, chunk("lo")));
        assert_eq!(contents(&out), vec!["hello"]);
    }
}

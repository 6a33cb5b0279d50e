//! Executor roles: one per non-reporter team member.
//!
//! An executor hands the history to its [`ExecutorAgent`] together with an
//! [`ExecutorTurn`], the toolbox through which the agent calls capabilities
//! and streams generation. Whatever the agent answers is wrapped and appended
//! to the history for the dispatcher to read.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::bus::TurnContext;
use crate::error::{RunError, RunResult, ServiceError, ServiceResult};
use crate::message::Message;
use crate::roles::Role;
use crate::services::{Capability, ChunkStream, ExecutorAgent};
use crate::state::{Command, SharedRunState};
use crate::team::RoleId;

/// Wrap a team member's output in the block the dispatcher expects.
pub fn wrap_response(name: &str, output: &str) -> String {
    format!(
        "Response from {name}:\n\n<response>\n{output}\n</response>\n\n*Please execute the next step.*"
    )
}

/// Capability toolbox and event handle for one executor turn.
pub struct ExecutorTurn<'a> {
    turn: &'a TurnContext,
    capabilities: &'a [Arc<dyn Capability>],
    request: Option<String>,
}

impl<'a> ExecutorTurn<'a> {
    pub fn new(turn: &'a TurnContext, capabilities: &'a [Arc<dyn Capability>]) -> Self {
        Self {
            turn,
            capabilities,
            request: None,
        }
    }

    /// Attach the latest user text of the run request.
    pub fn with_request(mut self, request: Option<String>) -> Self {
        self.request = request;
        self
    }

    /// Latest user text of the run request, if it had one.
    pub fn request(&self) -> Option<&str> {
        self.request.as_deref()
    }

    pub fn capabilities(&self) -> &[Arc<dyn Capability>] {
        self.capabilities
    }

    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// Invoke a capability by name. The call is published on the bus.
    pub async fn call(&self, name: &str, input: Value) -> ServiceResult<String> {
        let capability = self
            .capabilities
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| ServiceError::UnknownCapability(name.to_string()))?;
        self.turn.invoke_capability(capability.as_ref(), input).await
    }

    /// Publish a generation stream and return its visible text.
    pub async fn stream(&self, chunks: ChunkStream) -> ServiceResult<String> {
        self.turn.stream_generation(chunks).await
    }
}

pub struct ExecutorRole {
    name: String,
    agent: Arc<dyn ExecutorAgent>,
    capabilities: Vec<Arc<dyn Capability>>,
}

impl ExecutorRole {
    pub fn new(name: impl Into<String>, agent: Arc<dyn ExecutorAgent>) -> Self {
        Self {
            name: name.into(),
            agent,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Role for ExecutorRole {
    fn id(&self) -> RoleId {
        RoleId::Executor(self.name.clone())
    }

    async fn run(&self, state: &SharedRunState, turn: &TurnContext) -> RunResult<Command> {
        let toolbox =
            ExecutorTurn::new(turn, &self.capabilities).with_request(state.latest_user_text());
        let output = self
            .agent
            .invoke(&state.messages, &toolbox)
            .await
            .map_err(|e| RunError::service(&self.name, e))?;
        debug!(executor = %self.name, chars = output.len(), "executor finished");

        Ok(Command::to_role(RoleId::Dispatcher)
            .with_message(Message::user(wrap_response(&self.name, &output)).named(&self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;
    use crate::events::ExecutionEventKind;
    use crate::fakes::{EchoAgent, StaticCapability};
    use crate::message::MessageRole;
    use crate::team::{Goto, Team};
    use serde_json::json;

    fn state() -> SharedRunState {
        SharedRunState::new(vec![Message::user("find rust news")], Arc::new(Team::standard()))
    }

    #[test]
    fn test_wrap_response_format() {
        assert_eq!(
            wrap_response("coder", "4"),
            "Response from coder:\n\n<response>\n4\n</response>\n\n*Please execute the next step.*"
        );
    }

    #[tokio::test]
    async fn test_output_is_wrapped_and_named() {
        let (bus, _rx) = bus::channel(16);
        let turn = TurnContext::new(bus, RoleId::Executor("coder".into()), 4);
        let role = ExecutorRole::new("coder", Arc::new(EchoAgent::new("4")));

        let command = role.run(&state(), &turn).await.unwrap();
        assert_eq!(command.goto, Goto::Role(RoleId::Dispatcher));
        let message = &command.delta.messages[0];
        assert_eq!(message.name.as_deref(), Some("coder"));
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.text(), wrap_response("coder", "4"));
    }

    #[tokio::test]
    async fn test_agent_calls_capability_through_toolbox() {
        let (bus, mut rx) = bus::channel(16);
        let turn = TurnContext::new(bus, RoleId::Executor("researcher".into()), 4);
        let search = Arc::new(StaticCapability::ok("web_search", "three articles"));
        let role = ExecutorRole::new(
            "researcher",
            Arc::new(EchoAgent::new("summary").calling("web_search")),
        )
        .with_capability(search.clone());

        let command = role.run(&state(), &turn).await.unwrap();
        drop(turn);

        assert_eq!(search.calls(), vec![json!({"query": "find rust news"})]);
        assert!(command.delta.messages[0].text().contains("summary\nthree articles"));
        assert!(matches!(
            rx.recv().await.unwrap().kind,
            ExecutionEventKind::CapabilityStart { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_capability_is_service_error() {
        let (bus, _rx) = bus::channel(16);
        let turn = TurnContext::new(bus, RoleId::Executor("browser".into()), 4);
        let role = ExecutorRole::new("browser", Arc::new(EchoAgent::new("x").calling("browse")));

        let err = role.run(&state(), &turn).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Service {
                source: ServiceError::UnknownCapability(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failing_capability_reports_capability_kind() {
        let (bus, _rx) = bus::channel(16);
        let turn = TurnContext::new(bus, RoleId::Executor("coder".into()), 4);
        let role = ExecutorRole::new("coder", Arc::new(EchoAgent::new("x").calling("python_repl")))
            .with_capability(Arc::new(StaticCapability::failing("python_repl", "timeout")));

        let err = role.run(&state(), &turn).await.unwrap_err();
        assert_eq!(err.kind(), "capability");
    }
}

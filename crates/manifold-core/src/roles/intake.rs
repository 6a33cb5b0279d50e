//! Intake: answers small talk directly or hands the task to the planner.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bus::TurnContext;
use crate::error::{RunError, RunResult};
use crate::prompts::apply_prompt_template;
use crate::roles::Role;
use crate::services::GenerationService;
use crate::state::{Command, SharedRunState};
use crate::team::{RoleId, INTAKE_NAME};

/// Control marker the intake reply contains when the task needs planning.
pub const HANDOFF_MARKER: &str = "handoff_to_planner";

pub struct IntakeRole {
    generator: Arc<dyn GenerationService>,
}

impl IntakeRole {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Role for IntakeRole {
    fn id(&self) -> RoleId {
        RoleId::Intake
    }

    async fn run(&self, state: &SharedRunState, turn: &TurnContext) -> RunResult<Command> {
        let prompt = apply_prompt_template(INTAKE_NAME, &state.messages, None);
        let chunks = self
            .generator
            .stream(&prompt)
            .await
            .map_err(|e| RunError::service(INTAKE_NAME, e))?;
        let reply = turn
            .stream_generation(chunks)
            .await
            .map_err(|e| RunError::service(INTAKE_NAME, e))?;

        let handoff = reply.contains(HANDOFF_MARKER);
        debug!(handoff, chars = reply.len(), "intake reply complete");
        Ok(if handoff {
            Command::to_role(RoleId::Planner)
        } else {
            Command::terminal()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;
    use crate::message::Message;
    use crate::team::{Goto, Team};
    use crate::fakes::ScriptedGenerator;

    fn state(text: &str) -> SharedRunState {
        SharedRunState::new(vec![Message::user(text)], Arc::new(Team::standard()))
    }

    #[tokio::test]
    async fn test_marker_hands_off_to_planner() {
        let (bus, _rx) = bus::channel(64);
        let turn = TurnContext::new(bus, RoleId::Intake, 1);
        let role = IntakeRole::new(Arc::new(
            ScriptedGenerator::new().reply(&["handoff", "_to_planner()"]),
        ));

        let command = role.run(&state("plan a trip"), &turn).await.unwrap();
        assert_eq!(command.goto, Goto::Role(RoleId::Planner));
        assert!(command.delta.messages.is_empty());
    }

    #[tokio::test]
    async fn test_plain_reply_ends_run() {
        let (bus, _rx) = bus::channel(64);
        let turn = TurnContext::new(bus, RoleId::Intake, 1);
        let generator = Arc::new(ScriptedGenerator::new().reply(&["Hello", "!"]));
        let role = IntakeRole::new(generator.clone());

        let command = role.run(&state("hi"), &turn).await.unwrap();
        assert_eq!(command.goto, Goto::Terminal);
        assert!(command.delta.messages.is_empty());

        let prompt = &generator.prompts()[0];
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[1].text(), "hi");
    }

    #[tokio::test]
    async fn test_generation_failure_is_service_error() {
        let (bus, _rx) = bus::channel(64);
        let turn = TurnContext::new(bus, RoleId::Intake, 1);
        let role = IntakeRole::new(Arc::new(ScriptedGenerator::new()));

        let err = role.run(&state("hi"), &turn).await.unwrap_err();
        assert_eq!(err.kind(), "service");
    }
}

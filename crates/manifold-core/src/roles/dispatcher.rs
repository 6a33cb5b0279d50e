//! Dispatcher: asks the decision service who acts next.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bus::TurnContext;
use crate::error::{RunError, RunResult, ServiceError};
use crate::prompts::apply_prompt_template;
use crate::roles::Role;
use crate::routing::{parse_routing_decision, routing_decision_schema};
use crate::services::DecisionService;
use crate::state::{Command, SharedRunState};
use crate::team::{RoleId, DISPATCHER_NAME};

pub struct DispatcherRole {
    decider: Arc<dyn DecisionService>,
}

impl DispatcherRole {
    pub fn new(decider: Arc<dyn DecisionService>) -> Self {
        Self { decider }
    }
}

#[async_trait]
impl Role for DispatcherRole {
    fn id(&self) -> RoleId {
        RoleId::Dispatcher
    }

    async fn run(&self, state: &SharedRunState, _turn: &TurnContext) -> RunResult<Command> {
        let team = state.team.as_ref();
        let prompt = apply_prompt_template(DISPATCHER_NAME, &state.messages, Some(team));
        let schema = routing_decision_schema(team);

        let value = self
            .decider
            .decide(&prompt, &schema)
            .await
            .map_err(|e| match e {
                ServiceError::MalformedResponse(reason) => RunError::DecisionContract(reason),
                other => RunError::service(DISPATCHER_NAME, other),
            })?;
        let goto = parse_routing_decision(value, team)?;
        debug!(next = %goto, "dispatcher decided");

        Ok(Command::goto(goto).with_next())
    }
}

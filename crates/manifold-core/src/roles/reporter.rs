//! Reporter: streams the final report from the history so far.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::TurnContext;
use crate::error::{RunError, RunResult};
use crate::message::Message;
use crate::prompts::apply_prompt_template;
use crate::roles::{wrap_response, Role};
use crate::services::GenerationService;
use crate::state::{Command, SharedRunState};
use crate::team::{RoleId, REPORTER_NAME};

pub struct ReporterRole {
    generator: Arc<dyn GenerationService>,
}

impl ReporterRole {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Role for ReporterRole {
    fn id(&self) -> RoleId {
        RoleId::Reporter
    }

    async fn run(&self, state: &SharedRunState, turn: &TurnContext) -> RunResult<Command> {
        let prompt = apply_prompt_template(REPORTER_NAME, &state.messages, None);
        let chunks = self
            .generator
            .stream(&prompt)
            .await
            .map_err(|e| RunError::service(REPORTER_NAME, e))?;
        let report = turn
            .stream_generation(chunks)
            .await
            .map_err(|e| RunError::service(REPORTER_NAME, e))?;

        Ok(Command::to_role(RoleId::Dispatcher).with_message(
            Message::user(wrap_response(REPORTER_NAME, &report)).named(REPORTER_NAME),
        ))
    }
}

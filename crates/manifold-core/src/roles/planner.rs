//! Planner: drafts a JSON plan for the team, optionally after a web search.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::bus::TurnContext;
use crate::error::{RunError, RunResult};
use crate::message::Message;
use crate::plan::{parse_plan, PlanOutcome};
use crate::prompts::apply_prompt_template;
use crate::roles::Role;
use crate::services::{Capability, ModelRegistry, ModelTier};
use crate::state::{Command, SharedRunState};
use crate::team::{RoleId, PLANNER_NAME};

/// Heading placed above search results appended to the planner prompt.
pub const SEARCH_RESULTS_HEADING: &str = "# Relative Search Results";

pub struct PlannerRole {
    models: ModelRegistry,
    search: Option<Arc<dyn Capability>>,
}

impl PlannerRole {
    pub fn new(models: ModelRegistry) -> Self {
        Self {
            models,
            search: None,
        }
    }

    /// Search capability used when a run asks to search before planning.
    pub fn with_search(mut self, search: Arc<dyn Capability>) -> Self {
        self.search = Some(search);
        self
    }
}

#[async_trait]
impl Role for PlannerRole {
    fn id(&self) -> RoleId {
        RoleId::Planner
    }

    async fn run(&self, state: &SharedRunState, turn: &TurnContext) -> RunResult<Command> {
        let mut prompt = apply_prompt_template(PLANNER_NAME, &state.messages, Some(state.team.as_ref()));
        let tier = if state.deep_thinking {
            ModelTier::Reasoning
        } else {
            ModelTier::Basic
        };

        if state.search_before_plan {
            match &self.search {
                Some(search) => {
                    let query = state.latest_user_text().unwrap_or_default();
                    let results = turn
                        .invoke_capability(search.as_ref(), json!({ "query": query }))
                        .await
                        .map_err(|e| RunError::service(PLANNER_NAME, e))?;
                    if let Some(last) = prompt.last_mut() {
                        last.append_text(&format!("\n\n{SEARCH_RESULTS_HEADING}\n\n{results}"));
                    }
                }
                None => warn!("search before planning requested but no search capability is configured"),
            }
        }

        let chunks = self
            .models
            .get(tier)
            .stream(&prompt)
            .await
            .map_err(|e| RunError::service(PLANNER_NAME, e))?;
        let raw = turn
            .stream_generation(chunks)
            .await
            .map_err(|e| RunError::service(PLANNER_NAME, e))?;

        let outcome = parse_plan(&raw);
        let command = match &outcome {
            PlanOutcome::WellFormed { .. } => Command::to_role(RoleId::Dispatcher),
            PlanOutcome::Malformed { reason, .. } => {
                warn!(%reason, "planner response is not a valid plan, ending run");
                Command::terminal()
            }
        };
        debug!(?tier, well_formed = outcome.is_well_formed(), "plan drafted");

        let text = outcome.text().to_string();
        Ok(command
            .with_message(Message::user(text.clone()).named(PLANNER_NAME))
            .with_plan(text))
    }
}

//! The routing state machine.
//!
//! Starting at intake, the machine runs one role per turn, checks the
//! returned [`Command`] against the transition table, merges its delta into
//! the shared state and moves to the declared target. It stops at the
//! terminal state, on the first fatal error, or at the next role boundary
//! after cancellation is signalled or the cancellation sender is dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::bus::{EventBus, TurnContext};
use crate::error::{RunError, RunResult};
use crate::events::ExecutionEventKind;
use crate::metrics::METRICS;
use crate::obs;
use crate::roles::RoleSet;
use crate::routing::validate_transition;
use crate::state::SharedRunState;
use crate::team::{Goto, RoleId};

/// Final state of a machine run that did not fail.
#[derive(Debug, Clone)]
pub struct MachineOutcome {
    pub state: SharedRunState,
    pub turns: u32,
    /// Stopped by cancellation rather than by reaching the terminal state.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct RoutingStateMachine {
    roles: Arc<RoleSet>,
    max_turns: Option<u32>,
}

impl RoutingStateMachine {
    pub fn new(roles: Arc<RoleSet>) -> Self {
        Self {
            roles,
            max_turns: None,
        }
    }

    /// Fail the run once more than `max_turns` role turns would be needed.
    pub fn with_max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn roles(&self) -> &Arc<RoleSet> {
        &self.roles
    }

    /// Drive `state` until it reaches the terminal state or `cancel` flips.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(
        &self,
        run_id: &str,
        mut state: SharedRunState,
        bus: EventBus,
        cancel: watch::Receiver<bool>,
        debug_mode: bool,
    ) -> RunResult<MachineOutcome> {
        let mut turns = 0u32;

        while let Goto::Role(role) = state.next.clone() {
            if is_cancelled(&cancel) {
                return Ok(MachineOutcome {
                    state,
                    turns,
                    cancelled: true,
                });
            }
            if let Some(limit) = self.max_turns {
                if turns >= limit {
                    warn!(limit, "turn limit reached before terminal state");
                    return Err(RunError::TurnLimitExceeded(limit));
                }
            }

            turns += 1;
            let next = self.advance(&mut state, &role, &bus, turns).await?;
            METRICS.record_turn(&role);
            obs::emit_turn(
                run_id,
                turns,
                role.name(),
                &next.to_string(),
                state.messages.len(),
                debug_mode,
            );
            if role == RoleId::Planner {
                if let Some(plan) = &state.plan {
                    obs::emit_plan(run_id, plan, debug_mode);
                }
            }
        }

        Ok(MachineOutcome {
            state,
            turns,
            cancelled: false,
        })
    }

    /// Run exactly one turn of `role` and apply its command.
    ///
    /// The role's delta is merged only after its transition is validated, so
    /// a rejected command leaves the state untouched.
    pub async fn advance(
        &self,
        state: &mut SharedRunState,
        role: &RoleId,
        bus: &EventBus,
        step: u32,
    ) -> RunResult<Goto> {
        let handler = self
            .roles
            .get(role)
            .ok_or_else(|| RunError::UnknownRole(role.to_string()))?;
        let turn = TurnContext::new(bus.clone(), role.clone(), step);

        turn.emit(ExecutionEventKind::RoleEnter).await;
        let command = handler.run(state, &turn).await?;
        validate_transition(role, &command.goto, self.roles.team())?;

        state.apply(command.delta);
        state.next = command.goto.clone();
        turn.emit(ExecutionEventKind::RoleExit).await;

        Ok(command.goto)
    }
}

/// A run whose driver went away without signalling counts as cancelled.
fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

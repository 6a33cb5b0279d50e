//! Transition table and dispatcher decision validation.
//!
//! Every `Command` is checked against [`validate_transition`] before the
//! machine applies it, and every dispatcher reply goes through
//! [`parse_routing_decision`] before it is trusted.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{RunError, RunResult};
use crate::team::{Goto, RoleId, Team, FINISH};

/// Structured output of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingDecision {
    pub next: String,
}

impl RoutingDecision {
    /// Check `next` against the team and resolve it to a routing target.
    pub fn resolve(&self, team: &Team) -> RunResult<Goto> {
        if self.next == FINISH {
            return Ok(Goto::Terminal);
        }
        team.resolve(&self.next)
            .map(Goto::Role)
            .ok_or_else(|| {
                RunError::DecisionContract(format!(
                    "next = {:?} is not one of {:?}",
                    self.next,
                    team.decision_options()
                ))
            })
    }
}

/// JSON schema handed to the decision service for the dispatcher reply.
pub fn routing_decision_schema(team: &Team) -> Value {
    json!({
        "title": "RoutingDecision",
        "type": "object",
        "properties": {
            "next": {
                "type": "string",
                "enum": team.decision_options(),
            }
        },
        "required": ["next"],
        "additionalProperties": false,
    })
}

/// Parse a raw decision-service value and validate it against the team.
///
/// Any shape other than `{"next": <member | FINISH>}` is a fatal
/// decision-contract violation.
pub fn parse_routing_decision(value: Value, team: &Team) -> RunResult<Goto> {
    let decision: RoutingDecision = serde_json::from_value(value.clone()).map_err(|e| {
        RunError::DecisionContract(format!("expected {{\"next\": ...}}, got {value}: {e}"))
    })?;
    decision.resolve(team)
}

/// Whether `from -> to` is in the allowed transition set.
pub fn is_allowed_transition(from: &RoleId, to: &Goto, team: &Team) -> bool {
    match (from, to) {
        (RoleId::Intake, Goto::Role(RoleId::Planner) | Goto::Terminal) => true,
        (RoleId::Planner, Goto::Role(RoleId::Dispatcher) | Goto::Terminal) => true,
        (RoleId::Dispatcher, Goto::Terminal) => true,
        (RoleId::Dispatcher, Goto::Role(next)) => {
            matches!(next, RoleId::Executor(_) | RoleId::Reporter) && team.contains(next)
        }
        (RoleId::Executor(_) | RoleId::Reporter, Goto::Role(RoleId::Dispatcher)) => true,
        _ => false,
    }
}

/// Reject a transition outside the allowed set.
pub fn validate_transition(from: &RoleId, to: &Goto, team: &Team) -> RunResult<()> {
    if is_allowed_transition(from, to, team) {
        Ok(())
    } else {
        Err(RunError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

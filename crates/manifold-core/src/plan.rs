//! Plan document checks for the planner's accumulated output.
//!
//! A malformed plan is an expected outcome, not an error: the planner routes
//! to terminal instead of dispatching.

use serde_json::Value;

/// Result of checking the planner's output.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    WellFormed { text: String, document: Value },
    Malformed { text: String, reason: String },
}

impl PlanOutcome {
    /// The cleaned plan text, stored in state either way.
    pub fn text(&self) -> &str {
        match self {
            PlanOutcome::WellFormed { text, .. } | PlanOutcome::Malformed { text, .. } => text,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(self, PlanOutcome::WellFormed { .. })
    }
}

/// Strip a leading ```` ```json ```` / ```` ``` ```` fence and a trailing
/// ```` ``` ```` fence.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Clean the planner output and check that it is a JSON document.
pub fn parse_plan(raw: &str) -> PlanOutcome {
    let text = strip_code_fences(raw).to_string();
    match serde_json::from_str::<Value>(&text) {
        Ok(document) => PlanOutcome::WellFormed { text, document },
        Err(e) => PlanOutcome::Malformed {
            text,
            reason: e.to_string(),
        },
    }
}

//! Shared run state and the `Command` every role returns.

use std::sync::Arc;

use crate::message::{latest_user_text, Message};
use crate::team::{Goto, RoleId, Team};

/// Mutable record threaded through every role turn of one run.
///
/// Owned by the routing state machine. Roles only ever see `&SharedRunState`
/// and describe their changes as a [`StateDelta`].
#[derive(Debug, Clone)]
pub struct SharedRunState {
    pub messages: Vec<Message>,
    pub next: Goto,
    pub team: Arc<Team>,
    pub plan: Option<String>,
    pub deep_thinking: bool,
    pub search_before_plan: bool,
    /// Number of leading messages supplied by the consumer.
    input_len: usize,
}

impl SharedRunState {
    pub fn new(messages: Vec<Message>, team: Arc<Team>) -> Self {
        Self {
            input_len: messages.len(),
            messages,
            next: Goto::Role(RoleId::Intake),
            team,
            plan: None,
            deep_thinking: false,
            search_before_plan: false,
        }
    }

    pub fn with_modes(mut self, deep_thinking: bool, search_before_plan: bool) -> Self {
        self.deep_thinking = deep_thinking;
        self.search_before_plan = search_before_plan;
        self
    }

    /// Merge one turn's delta. History is append-only.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        if let Some(next) = delta.next {
            self.next = next;
        }
        if let Some(plan) = delta.plan {
            self.plan = Some(plan);
        }
    }

    /// Messages supplied with the run request, before any role output.
    pub fn input(&self) -> &[Message] {
        &self.messages[..self.input_len.min(self.messages.len())]
    }

    /// Text of the latest `user` message of the run request. Role outputs
    /// appended later never count, even though they use the `user` role.
    pub fn latest_user_text(&self) -> Option<String> {
        latest_user_text(self.input())
    }
}

/// Partial update produced by one role turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub next: Option<Goto>,
    pub plan: Option<String>,
}

/// The universal return value of a role turn: what to change and where to go.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub delta: StateDelta,
    pub goto: Goto,
}

impl Command {
    pub fn goto(goto: Goto) -> Self {
        Self {
            delta: StateDelta::default(),
            goto,
        }
    }

    pub fn to_role(role: RoleId) -> Self {
        Self::goto(Goto::Role(role))
    }

    pub fn terminal() -> Self {
        Self::goto(Goto::Terminal)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.delta.messages.push(message);
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.delta.plan = Some(plan.into());
        self
    }

    /// Record the routing target in state as well as following it.
    pub fn with_next(mut self) -> Self {
        self.delta.next = Some(self.goto.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedRunState {
        SharedRunState::new(vec![Message::user("hello")], Arc::new(Team::standard()))
    }

    #[test]
    fn test_new_state_starts_at_intake() {
        let s = state();
        assert_eq!(s.next, Goto::Role(RoleId::Intake));
        assert!(s.plan.is_none());
    }

    #[test]
    fn test_apply_appends_and_sets_fields() {
        let mut s = state();
        let command = Command::to_role(RoleId::Dispatcher)
            .with_message(Message::user("{}").named("planner"))
            .with_plan("{}")
            .with_next();
        s.apply(command.delta);

        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.plan.as_deref(), Some("{}"));
        assert_eq!(s.next, Goto::Role(RoleId::Dispatcher));
    }

    #[test]
    fn test_latest_user_text_ignores_role_output() {
        let mut s = SharedRunState::new(
            vec![
                Message::user("first"),
                Message::user("GDP of France?").named("alice"),
            ],
            Arc::new(Team::standard()),
        );
        s.apply(
            Command::to_role(RoleId::Dispatcher)
                .with_message(Message::user("Response from coder").named("coder"))
                .delta,
        );
        assert_eq!(s.input().len(), 2);
        assert_eq!(s.latest_user_text().as_deref(), Some("GDP of France?"));
    }

    #[test]
    fn test_empty_delta_changes_nothing() {
        let mut s = state();
        s.apply(StateDelta::default());
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.next, Goto::Role(RoleId::Intake));
    }
}

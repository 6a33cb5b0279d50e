//! The fixed roles of a run and the registry the machine dispatches through.
//!
//! # Module layout
//!
//! - [`intake`] — `IntakeRole`, greets or hands off to the planner
//! - [`planner`] — `PlannerRole`, drafts and validates the plan
//! - [`dispatcher`] — `DispatcherRole`, picks the next team member or finishes
//! - [`executor`] — `ExecutorRole`, `ExecutorTurn`, the response wrapper
//! - [`reporter`] — `ReporterRole`, writes the final report

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::TurnContext;
use crate::error::{RunResult, TeamError};
use crate::state::{Command, SharedRunState};
use crate::team::{RoleId, Team};

pub mod dispatcher;
pub mod executor;
pub mod intake;
pub mod planner;
pub mod reporter;

pub use dispatcher::DispatcherRole;
pub use executor::{wrap_response, ExecutorRole, ExecutorTurn};
pub use intake::{IntakeRole, HANDOFF_MARKER};
pub use planner::PlannerRole;
pub use reporter::ReporterRole;

/// One step of the routing machine: read the state, publish progress, return
/// the delta to apply and where to go next.
#[async_trait]
pub trait Role: Send + Sync {
    fn id(&self) -> RoleId;

    async fn run(&self, state: &SharedRunState, turn: &TurnContext) -> RunResult<Command>;
}

/// Complete set of roles for one team, checked at build time.
#[derive(Clone)]
pub struct RoleSet {
    team: Arc<Team>,
    roles: HashMap<RoleId, Arc<dyn Role>>,
}

impl RoleSet {
    pub fn builder(team: Arc<Team>) -> RoleSetBuilder {
        RoleSetBuilder {
            team,
            roles: HashMap::new(),
        }
    }

    pub fn team(&self) -> &Arc<Team> {
        &self.team
    }

    pub fn get(&self, id: &RoleId) -> Option<&Arc<dyn Role>> {
        self.roles.get(id)
    }
}

impl std::fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.roles.keys().map(RoleId::to_string).collect();
        ids.sort();
        f.debug_struct("RoleSet")
            .field("team", &self.team.names())
            .field("roles", &ids)
            .finish()
    }
}

pub struct RoleSetBuilder {
    team: Arc<Team>,
    roles: HashMap<RoleId, Arc<dyn Role>>,
}

impl RoleSetBuilder {
    /// Register a role under its own id; a later registration replaces an
    /// earlier one.
    pub fn with_role(mut self, role: Arc<dyn Role>) -> Self {
        self.roles.insert(role.id(), role);
        self
    }

    /// Require the three fixed roles plus one role per team member, and
    /// nothing else.
    pub fn build(self) -> Result<RoleSet, TeamError> {
        let required: Vec<RoleId> = [RoleId::Intake, RoleId::Planner, RoleId::Dispatcher]
            .into_iter()
            .chain(self.team.roles())
            .collect();

        if let Some(missing) = required.iter().find(|id| !self.roles.contains_key(id)) {
            return Err(TeamError::MissingRole(missing.to_string()));
        }
        if let Some(extra) = self.roles.keys().find(|id| !required.contains(id)) {
            return Err(TeamError::UnexpectedRole(extra.to_string()));
        }

        Ok(RoleSet {
            team: self.team,
            roles: self.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{EchoAgent, ScriptedDecider, ScriptedGenerator};
    use crate::services::ModelRegistry;
    use crate::team::TeamMember;

    fn roles_for(team: &Team) -> Vec<Arc<dyn Role>> {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut roles: Vec<Arc<dyn Role>> = vec![
            Arc::new(IntakeRole::new(generator.clone())),
            Arc::new(PlannerRole::new(ModelRegistry::new(generator.clone()))),
            Arc::new(DispatcherRole::new(Arc::new(ScriptedDecider::sequence(&[
                "FINISH",
            ])))),
        ];
        for member in team.members() {
            match member.role_id() {
                RoleId::Reporter => roles.push(Arc::new(ReporterRole::new(generator.clone()))),
                RoleId::Executor(name) => roles.push(Arc::new(ExecutorRole::new(
                    name,
                    Arc::new(EchoAgent::new("done")),
                ))),
                _ => {}
            }
        }
        roles
    }

    #[test]
    fn test_build_requires_every_member() {
        let team = Arc::new(Team::standard());
        let mut roles = roles_for(&team);
        roles.retain(|r| r.id() != RoleId::Executor("browser".into()));

        let builder = roles
            .into_iter()
            .fold(RoleSet::builder(team), |b, r| b.with_role(r));
        assert_eq!(
            builder.build().err(),
            Some(TeamError::MissingRole("browser".into()))
        );
    }

    #[test]
    fn test_build_rejects_roles_outside_team() {
        let team = Arc::new(Team::new(vec![TeamMember::executor("coder", "")]).unwrap());
        let builder = roles_for(&team)
            .into_iter()
            .fold(RoleSet::builder(team), |b, r| b.with_role(r))
            .with_role(Arc::new(ExecutorRole::new(
                "painter",
                Arc::new(EchoAgent::new("art")),
            )));
        assert_eq!(
            builder.build().err(),
            Some(TeamError::UnexpectedRole("painter".into()))
        );
    }

    #[test]
    fn test_complete_set_builds() {
        let team = Arc::new(Team::standard());
        let set = roles_for(&team)
            .into_iter()
            .fold(RoleSet::builder(Arc::clone(&team)), |b, r| b.with_role(r))
            .build()
            .unwrap();
        assert!(set.get(&RoleId::Reporter).is_some());
        assert!(set.get(&RoleId::Executor("coder".into())).is_some());
        assert_eq!(set.team().names().len(), 4);
    }
}

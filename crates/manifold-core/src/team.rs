//! Role vocabulary: `RoleId`, `Goto`, and the configured `Team`.
//!
//! The fixed roles (intake, planner, dispatcher) surround a team that is
//! chosen at configuration time. The team is a closed set; every routing
//! decision is validated against it.

use serde::{Deserialize, Serialize};

use crate::error::TeamError;

/// Wire name of the intake role.
pub const INTAKE_NAME: &str = "coordinator";
/// Wire name of the planning role.
pub const PLANNER_NAME: &str = "planner";
/// Wire name of the dispatch/decision role.
pub const DISPATCHER_NAME: &str = "supervisor";
/// Wire name of the reporting role.
pub const REPORTER_NAME: &str = "reporter";
/// Dispatcher decision value that ends the run.
pub const FINISH: &str = "FINISH";

/// Identity of a role in the routing state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleId {
    Intake,
    Planner,
    Dispatcher,
    Reporter,
    Executor(String),
}

impl RoleId {
    /// Name used on the wire and in prompts.
    pub fn name(&self) -> &str {
        match self {
            RoleId::Intake => INTAKE_NAME,
            RoleId::Planner => PLANNER_NAME,
            RoleId::Dispatcher => DISPATCHER_NAME,
            RoleId::Reporter => REPORTER_NAME,
            RoleId::Executor(name) => name,
        }
    }

    pub fn is_executor(&self) -> bool {
        matches!(self, RoleId::Executor(_))
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Routing target chosen by a role at the end of its turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Goto {
    Role(RoleId),
    Terminal,
}

impl std::fmt::Display for Goto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Goto::Role(role) => write!(f, "{role}"),
            Goto::Terminal => f.write_str("__end__"),
        }
    }
}

/// What a team member does when dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Executor,
    Reporter,
}

/// A member of the team the dispatcher can route to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub kind: MemberKind,
    /// Shown to the planner and dispatcher so they know what the member does.
    #[serde(default)]
    pub description: String,
}

impl TeamMember {
    pub fn executor(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Executor,
            description: description.into(),
        }
    }

    pub fn reporter(description: impl Into<String>) -> Self {
        Self {
            name: REPORTER_NAME.to_string(),
            kind: MemberKind::Reporter,
            description: description.into(),
        }
    }

    pub fn role_id(&self) -> RoleId {
        match self.kind {
            MemberKind::Reporter => RoleId::Reporter,
            MemberKind::Executor => RoleId::Executor(self.name.clone()),
        }
    }
}

/// Closed, ordered set of team members fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    members: Vec<TeamMember>,
}

impl Team {
    /// Validate and freeze a team.
    ///
    /// Rejects empty teams, duplicate names, names that collide with the
    /// fixed roles or the `FINISH` sentinel, and a reporter not named
    /// `reporter`.
    pub fn new(members: Vec<TeamMember>) -> Result<Self, TeamError> {
        if members.is_empty() {
            return Err(TeamError::Empty);
        }

        let mut seen = std::collections::BTreeSet::new();
        for member in &members {
            let reserved = [INTAKE_NAME, PLANNER_NAME, DISPATCHER_NAME, FINISH];
            if reserved.contains(&member.name.as_str()) || member.name.is_empty() {
                return Err(TeamError::ReservedName(member.name.clone()));
            }
            match member.kind {
                MemberKind::Reporter if member.name != REPORTER_NAME => {
                    return Err(TeamError::ReporterName(member.name.clone()));
                }
                MemberKind::Executor if member.name == REPORTER_NAME => {
                    return Err(TeamError::ReservedName(member.name.clone()));
                }
                _ => {}
            }
            if !seen.insert(member.name.as_str()) {
                return Err(TeamError::DuplicateMember(member.name.clone()));
            }
        }

        Ok(Self { members })
    }

    /// The team used when nothing else is configured: researcher, coder,
    /// browser and reporter.
    pub fn standard() -> Self {
        Self {
            members: vec![
                TeamMember::executor(
                    "researcher",
                    "Uses search engines and web crawlers to gather information from the internet.",
                ),
                TeamMember::executor(
                    "coder",
                    "Executes code, performs mathematical calculations and writes technical solutions.",
                ),
                TeamMember::executor(
                    "browser",
                    "Directly interacts with web pages to perform complex operations.",
                ),
                TeamMember::reporter("Writes a professional report based on the results of each step."),
            ],
        }
    }

    pub fn members(&self) -> &[TeamMember] {
        &self.members
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    /// Role identifiers of every member, in configuration order.
    pub fn roles(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.members.iter().map(TeamMember::role_id)
    }

    /// Resolve a member name to its role.
    pub fn resolve(&self, name: &str) -> Option<RoleId> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .map(TeamMember::role_id)
    }

    pub fn contains(&self, role: &RoleId) -> bool {
        self.members.iter().any(|m| &m.role_id() == role)
    }

    /// Values the dispatcher may return: every member plus `FINISH`.
    pub fn decision_options(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| m.name.clone())
            .chain(std::iter::once(FINISH.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_team_has_four_members_with_reporter() {
        let team = Team::standard();
        assert_eq!(team.names(), vec!["researcher", "coder", "browser", "reporter"]);
        assert!(team.contains(&RoleId::Reporter));
        assert!(team.contains(&RoleId::Executor("coder".into())));
        assert!(!team.contains(&RoleId::Planner));
    }

    #[test]
    fn test_resolve_maps_reporter_kind() {
        let team = Team::standard();
        assert_eq!(team.resolve("reporter"), Some(RoleId::Reporter));
        assert_eq!(
            team.resolve("browser"),
            Some(RoleId::Executor("browser".into()))
        );
        assert_eq!(team.resolve("painter"), None);
    }

    #[test]
    fn test_team_rejects_reserved_and_duplicate_names() {
        assert_eq!(Team::new(vec![]), Err(TeamError::Empty));
        assert_eq!(
            Team::new(vec![TeamMember::executor("supervisor", "")]),
            Err(TeamError::ReservedName("supervisor".into()))
        );
        assert_eq!(
            Team::new(vec![TeamMember::executor("FINISH", "")]),
            Err(TeamError::ReservedName("FINISH".into()))
        );
        assert_eq!(
            Team::new(vec![
                TeamMember::executor("coder", ""),
                TeamMember::executor("coder", ""),
            ]),
            Err(TeamError::DuplicateMember("coder".into()))
        );
        let misnamed = TeamMember {
            name: "writer".into(),
            kind: MemberKind::Reporter,
            description: String::new(),
        };
        assert_eq!(
            Team::new(vec![misnamed]),
            Err(TeamError::ReporterName("writer".into()))
        );
    }

    #[test]
    fn test_decision_options_end_with_finish() {
        let team = Team::new(vec![TeamMember::executor("coder", "")]).unwrap();
        assert_eq!(team.decision_options(), vec!["coder", "FINISH"]);
    }

    #[test]
    fn test_role_names_on_the_wire() {
        assert_eq!(RoleId::Intake.to_string(), "coordinator");
        assert_eq!(RoleId::Dispatcher.to_string(), "supervisor");
        assert_eq!(Goto::Terminal.to_string(), "__end__");
    }
}

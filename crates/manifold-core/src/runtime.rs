//! Assemble a ready-to-run [`RunDriver`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agents::PromptedExecutor;
use crate::capabilities::{TavilySearch, Workspace, WEB_SEARCH};
use crate::config::{ManifoldConfig, ModelConfig};
use crate::driver::{DriverSettings, RunDriver};
use crate::error::{ConfigError, ServiceError};
use crate::llm::OpenAiClient;
use crate::machine::RoutingStateMachine;
use crate::roles::{DispatcherRole, ExecutorRole, IntakeRole, PlannerRole, ReporterRole, RoleSet};
use crate::services::{Capability, DecisionService, ModelRegistry, ModelTier};
use crate::team::MemberKind;

/// The external services roles are wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub models: ModelRegistry,
    pub decider: Arc<dyn DecisionService>,
    pub search: Option<Arc<dyn Capability>>,
}

/// Build the driver for `config` against OpenAI-compatible models and,
/// when a key is configured, Tavily search.
pub fn build_driver(config: &ManifoldConfig) -> Result<RunDriver, ConfigError> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .user_agent(concat!("manifold/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ServiceError::from)?;

    let client = |model: &ModelConfig| {
        Arc::new(OpenAiClient::new(
            http.clone(),
            model.base_url.clone(),
            model.model.clone(),
            model.api_key.clone(),
        ))
    };

    let mut models = ModelRegistry::new(client(&config.models.basic));
    if let Some(reasoning) = &config.models.reasoning {
        models = models.with_reasoning(client(reasoning));
    }
    if let Some(vision) = &config.models.vision {
        models = models.with_vision(client(vision));
    }

    let search = config.search.api_key.as_ref().map(|key| {
        Arc::new(TavilySearch::new(http.clone(), key.clone(), config.search.max_results))
            as Arc<dyn Capability>
    });

    let collaborators = Collaborators {
        models,
        decider: client(&config.models.basic),
        search,
    };
    assemble(config, collaborators)
}

/// Resolve a configured capability name. `None` when the capability needs
/// a collaborator that is not configured.
fn resolve_capability(
    name: &str,
    search: Option<&Arc<dyn Capability>>,
    workspace: &[Arc<dyn Capability>],
) -> Option<Arc<dyn Capability>> {
    if name == WEB_SEARCH {
        return search.cloned();
    }
    workspace.iter().find(|c| c.name() == name).cloned()
}

/// Wire every role of the configured team to `collaborators`.
///
/// File capabilities are rooted at `config.workspace.root`.
pub fn assemble(
    config: &ManifoldConfig,
    collaborators: Collaborators,
) -> Result<RunDriver, ConfigError> {
    let team = Arc::new(config.team()?);
    let Collaborators {
        models,
        decider,
        search,
    } = collaborators;

    let mut planner = PlannerRole::new(models.clone());
    if let Some(search) = &search {
        planner = planner.with_search(Arc::clone(search));
    }

    let mut builder = RoleSet::builder(Arc::clone(&team))
        .with_role(Arc::new(IntakeRole::new(models.get(ModelTier::Basic))))
        .with_role(Arc::new(planner))
        .with_role(Arc::new(DispatcherRole::new(Arc::clone(&decider))));

    let workspace = Workspace::new(&config.workspace.root).capabilities();

    for member in &config.team {
        let generator = models.get(member.tier);
        builder = match member.kind {
            MemberKind::Reporter => builder.with_role(Arc::new(ReporterRole::new(generator))),
            MemberKind::Executor => {
                let mut agent = PromptedExecutor::new(&member.name, generator);
                let mut capabilities: Vec<Arc<dyn Capability>> = Vec::new();

                if let Some(lookup) = &member.lookup {
                    match resolve_capability(lookup, search.as_ref(), &workspace) {
                        Some(capability) => {
                            agent = agent.with_lookup(lookup);
                            capabilities.push(capability);
                        }
                        None => warn!(
                            member = %member.name,
                            capability = %lookup,
                            "lookup disabled, no search api key configured"
                        ),
                    }
                }

                let mut tool_count = 0;
                for name in &member.capabilities {
                    if capabilities.iter().any(|c| c.name() == name) {
                        continue;
                    }
                    match resolve_capability(name, search.as_ref(), &workspace) {
                        Some(capability) => {
                            capabilities.push(capability);
                            tool_count += 1;
                        }
                        None => warn!(
                            member = %member.name,
                            capability = %name,
                            "capability disabled, no search api key configured"
                        ),
                    }
                }
                if tool_count > 0 && config.run.max_tool_steps > 0 {
                    agent = agent.with_tools(Arc::clone(&decider), config.run.max_tool_steps);
                }

                let mut role = ExecutorRole::new(&member.name, Arc::new(agent));
                for capability in capabilities {
                    role = role.with_capability(capability);
                }
                builder.with_role(Arc::new(role))
            }
        };
    }

    let roles = builder.build()?;
    info!(
        team = ?team.names(),
        search = search.is_some(),
        workspace = %config.workspace.root.display(),
        max_turns = ?config.run.max_turns,
        "role set assembled"
    );

    let machine = RoutingStateMachine::new(Arc::new(roles)).with_max_turns(config.run.max_turns);
    Ok(RunDriver::new(
        machine,
        DriverSettings {
            bus_capacity: config.run.bus_capacity,
            event_capacity: config.run.event_capacity,
        },
    ))
}

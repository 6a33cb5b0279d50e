//! Manifold Core Library
//!
//! Routes one user task through a fixed set of roles (intake, planner,
//! dispatcher, executor team, reporter) and exposes the run as a live,
//! cancellable stream of external events.
//!
//! # Module layout
//!
//! - [`machine`] — `RoutingStateMachine`, one role turn at a time
//! - [`roles`] — the `Role` trait, `RoleSet` and the five role kinds
//! - [`routing`] — transition table and dispatcher decision validation
//! - [`bus`] / [`events`] — execution events and the external vocabulary
//! - [`translator`] / [`token_buffer`] — execution to external event mapping
//! - [`driver`] — `RunDriver`, one run end to end
//! - [`services`] — collaborator traits; [`llm`] and [`capabilities`] adapters
//! - [`config`] / [`runtime`] — configuration and driver assembly
//! - [`fakes`] — deterministic collaborators for tests

pub mod agents;
pub mod bus;
pub mod capabilities;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod fakes;
pub mod llm;
pub mod machine;
pub mod message;
pub mod metrics;
pub mod obs;
pub mod plan;
pub mod prompts;
pub mod roles;
pub mod routing;
pub mod runtime;
pub mod services;
pub mod state;
pub mod team;
pub mod telemetry;
pub mod token_buffer;
pub mod translator;

pub use config::ManifoldConfig;
pub use driver::{DriverSettings, RunDriver, RunHandle, RunReport, RunRequest, RunStatus};
pub use error::{ConfigError, RunError, RunResult, ServiceError, ServiceResult, TeamError};
pub use events::{ExecutionEvent, ExecutionEventKind, ExternalEvent, MessageDelta};
pub use machine::{MachineOutcome, RoutingStateMachine};
pub use message::{ContentPart, Message, MessageContent, MessageRole};
pub use plan::PlanOutcome;
pub use roles::{Role, RoleSet};
pub use routing::RoutingDecision;
pub use runtime::{assemble, build_driver, Collaborators};
pub use services::{
    Capability, ChunkStream, DecisionService, ExecutorAgent, GenerationChunk, GenerationService,
    ModelRegistry, ModelTier,
};
pub use state::{Command, SharedRunState, StateDelta};
pub use team::{Goto, MemberKind, RoleId, Team, TeamMember};
pub use translator::EventTranslator;

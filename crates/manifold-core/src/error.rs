//! Error taxonomy for Manifold runs and their collaborators.

/// Failures raised by the external collaborators a role talks to: the
/// generation service, the decision service and capabilities.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation stream error: {0}")]
    Stream(String),

    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    #[error("capability {name} failed: {reason}")]
    Capability { name: String, reason: String },

    #[error("invalid capability input: {0}")]
    InvalidInput(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("scripted service exhausted: {0}")]
    Exhausted(String),
}

/// Result type for collaborator calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Problems with the configured team or the role set built from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeamError {
    #[error("team must contain at least one member")]
    Empty,

    #[error("duplicate team member: {0}")]
    DuplicateMember(String),

    #[error("team member name is reserved: {0}")]
    ReservedName(String),

    #[error("reporter member must be named \"reporter\", got {0}")]
    ReporterName(String),

    #[error("no role registered for {0}")]
    MissingRole(String),

    #[error("role {0} is not part of the team")]
    UnexpectedRole(String),
}

/// Run-level failures. Everything except [`RunError::EmptyInput`] happens
/// after the stream has started and is surfaced to the consumer as an
/// `error` event.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("run input must contain at least one message")]
    EmptyInput,

    #[error("decision contract violated: {0}")]
    DecisionContract(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("no role registered for {0}")]
    UnknownRole(String),

    #[error("turn limit of {0} exceeded")]
    TurnLimitExceeded(u32),

    #[error("role {role} failed: {source}")]
    Service {
        role: String,
        #[source]
        source: ServiceError,
    },

    #[error("run task failed: {0}")]
    Internal(String),
}

impl RunError {
    /// Wrap a collaborator failure with the role that observed it.
    pub fn service(role: impl ToString, source: ServiceError) -> Self {
        RunError::Service {
            role: role.to_string(),
            source,
        }
    }

    /// Stable machine-readable error kind, used in the `error` wire event.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::EmptyInput => "input",
            RunError::DecisionContract(_) => "decision_contract",
            RunError::IllegalTransition { .. } => "illegal_transition",
            RunError::UnknownRole(_) => "unknown_role",
            RunError::TurnLimitExceeded(_) => "turn_limit",
            RunError::Service {
                source: ServiceError::Capability { .. },
                ..
            } => "capability",
            RunError::Service { .. } => "service",
            RunError::Internal(_) => "internal",
        }
    }
}

/// Result type for run operations.
pub type RunResult<T> = std::result::Result<T, RunError>;

/// Configuration loading and assembly failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid team: {0}")]
    Team(#[from] TeamError),

    #[error("failed to build service client: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

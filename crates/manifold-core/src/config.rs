//! Configuration: a TOML file plus environment overrides.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! standard four-member team backed by an OpenAI-compatible endpoint.
//!
//! Environment overrides:
//! - `OPENAI_API_KEY` — key for every model tier without its own key
//! - `MANIFOLD_BASE_URL`, `MANIFOLD_MODEL` — basic tier endpoint and model
//! - `MANIFOLD_REASONING_MODEL`, `MANIFOLD_VISION_MODEL` — enable those tiers
//! - `TAVILY_API_KEY` — enables web search
//! - `MANIFOLD_WORKSPACE` — root directory of the file capabilities
//! - `MANIFOLD_MAX_TURNS` — turn bound per run
//! - `MANIFOLD_BIND` — server listen address
//!
//! `MANIFOLD_LOG` and `RUST_LOG` are read when tracing starts, not here; see
//! [`crate::telemetry`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capabilities::{KNOWN_CAPABILITIES, LIST_DIRECTORY, READ_FILE, WEB_SEARCH, WRITE_FILE};
use crate::error::ConfigError;
use crate::services::ModelTier;
use crate::team::{MemberKind, Team, TeamMember, REPORTER_NAME};
use crate::telemetry::LogConfig;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
        }
    }
}

impl ModelConfig {
    fn with_model(model: String) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub basic: ModelConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ModelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: 5,
        }
    }
}

/// Directory the file capabilities read and write under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// One configured team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: MemberKind,
    #[serde(default)]
    pub description: String,
    /// Capability called with the user query before generating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<String>,
    /// Capabilities the member may choose to call while working.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tier: ModelTier,
}

fn default_kind() -> MemberKind {
    MemberKind::Executor
}

impl MemberConfig {
    fn executor(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: MemberKind::Executor,
            description: description.to_string(),
            lookup: None,
            capabilities: Vec::new(),
            tier: ModelTier::Basic,
        }
    }

    pub fn member(&self) -> TeamMember {
        TeamMember {
            name: self.name.clone(),
            kind: self.kind,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Capability calls an executor may make in one turn before answering.
    pub max_tool_steps: u32,
    pub bus_capacity: usize,
    pub event_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            max_tool_steps: 5,
            bus_capacity: 64,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifoldConfig {
    pub models: ModelsConfig,
    pub search: SearchConfig,
    pub workspace: WorkspaceConfig,
    pub run: RunConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
    pub team: Vec<MemberConfig>,
}

impl Default for ManifoldConfig {
    fn default() -> Self {
        let mut researcher = MemberConfig::executor(
            "researcher",
            "Uses search engines and web crawlers to gather information from the internet.",
        );
        researcher.lookup = Some(WEB_SEARCH.to_string());
        let mut coder = MemberConfig::executor(
            "coder",
            "Executes code, performs mathematical calculations and writes technical solutions.",
        );
        coder.capabilities = [LIST_DIRECTORY, READ_FILE, WRITE_FILE]
            .map(String::from)
            .to_vec();
        let mut browser = MemberConfig::executor(
            "browser",
            "Directly interacts with web pages to perform complex operations.",
        );
        browser.tier = ModelTier::Vision;

        Self {
            models: ModelsConfig::default(),
            search: SearchConfig::default(),
            workspace: WorkspaceConfig::default(),
            run: RunConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            team: vec![
                researcher,
                coder,
                browser,
                MemberConfig {
                    name: REPORTER_NAME.to_string(),
                    kind: MemberKind::Reporter,
                    description: "Writes a professional report based on the results of each step."
                        .to_string(),
                    lookup: None,
                    capabilities: Vec::new(),
                    tier: ModelTier::Basic,
                },
            ],
        }
    }
}

impl ManifoldConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Load `path` when given, otherwise start from the defaults; then apply
    /// the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup` (the process environment in
    /// production, a map in tests).
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MANIFOLD_BASE_URL") {
            self.models.basic.base_url = url;
        }
        if let Some(model) = lookup("MANIFOLD_MODEL") {
            self.models.basic.model = model;
        }
        if let Some(model) = lookup("MANIFOLD_REASONING_MODEL") {
            self.models.reasoning = Some(ModelConfig::with_model(model));
        }
        if let Some(model) = lookup("MANIFOLD_VISION_MODEL") {
            self.models.vision = Some(ModelConfig::with_model(model));
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            let tiers = std::iter::once(&mut self.models.basic)
                .chain(self.models.reasoning.as_mut())
                .chain(self.models.vision.as_mut());
            for tier in tiers {
                tier.api_key.get_or_insert_with(|| key.clone());
            }
        }
        if let Some(key) = lookup("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(root) = lookup("MANIFOLD_WORKSPACE") {
            self.workspace.root = PathBuf::from(root);
        }
        if let Some(raw) = lookup("MANIFOLD_MAX_TURNS") {
            let turns = raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "MANIFOLD_MAX_TURNS".to_string(),
                reason: e.to_string(),
            })?;
            self.run.max_turns = Some(turns);
        }
        if let Some(bind) = lookup("MANIFOLD_BIND") {
            self.server.bind = bind;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.bus_capacity == 0 {
            return Err(invalid("run.bus_capacity", "must be at least 1"));
        }
        if self.run.event_capacity == 0 {
            return Err(invalid("run.event_capacity", "must be at least 1"));
        }
        if self.run.max_turns == Some(0) {
            return Err(invalid("run.max_turns", "must be at least 1 when set"));
        }
        self.log.validate()?;
        if let Some(member) = self
            .team
            .iter()
            .find(|m| m.lookup.as_deref().is_some_and(|l| l != WEB_SEARCH))
        {
            return Err(invalid(
                &format!("team.{}.lookup", member.name),
                "only \"web_search\" is available",
            ));
        }
        for member in &self.team {
            if let Some(unknown) = member
                .capabilities
                .iter()
                .find(|c| !KNOWN_CAPABILITIES.contains(&c.as_str()))
            {
                return Err(invalid(
                    &format!("team.{}.capabilities", member.name),
                    &format!(
                        "unknown capability {unknown:?}, expected one of {}",
                        KNOWN_CAPABILITIES.join(", ")
                    ),
                ));
            }
            if member.kind == MemberKind::Reporter && !member.capabilities.is_empty() {
                return Err(invalid(
                    &format!("team.{}.capabilities", member.name),
                    "the reporter takes no capabilities",
                ));
            }
        }
        self.team()?;
        Ok(())
    }

    pub fn team(&self) -> Result<Team, ConfigError> {
        Ok(Team::new(self.team.iter().map(MemberConfig::member).collect())?)
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let tiers = std::iter::once(&mut copy.models.basic)
            .chain(copy.models.reasoning.as_mut())
            .chain(copy.models.vision.as_mut());
        for tier in tiers {
            if tier.api_key.is_some() {
                tier.api_key = Some(REDACTED.to_string());
            }
        }
        if copy.search.api_key.is_some() {
            copy.search.api_key = Some(REDACTED.to_string());
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

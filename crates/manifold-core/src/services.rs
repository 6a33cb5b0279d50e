//! Collaborator contracts consumed by roles.
//!
//! The orchestration core depends only on these traits. Production adapters
//! live in [`crate::llm`] and [`crate::capabilities`]; deterministic stand-ins
//! live in [`crate::fakes`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceResult;
use crate::message::Message;
use crate::roles::executor::ExecutorTurn;

/// One increment of streamed generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationChunk {
    pub text: Option<String>,
    pub reasoning: Option<String>,
}

impl GenerationChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            reasoning: None,
        }
    }

    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            text: None,
            reasoning: Some(reasoning.into()),
        }
    }
}

/// Lazy, finite, non-restartable sequence of generation chunks.
pub type ChunkStream = BoxStream<'static, ServiceResult<GenerationChunk>>;

/// Streams free text for a prompt.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn stream(&self, messages: &[Message]) -> ServiceResult<ChunkStream>;
}

/// Produces a structured value constrained by a JSON schema. The caller
/// validates the value; implementations must not be trusted to honour the
/// schema.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, messages: &[Message], schema: &Value) -> ServiceResult<Value>;
}

/// An opaque external action (search, file I/O, code execution, browser).
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// One line telling an agent what the capability does and what input it
    /// takes.
    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, input: &Value) -> ServiceResult<String>;
}

/// The collaborator behind an executor role. It receives the history and a
/// turn handle through which it calls capabilities and streams generation.
#[async_trait]
pub trait ExecutorAgent: Send + Sync {
    async fn invoke(&self, messages: &[Message], turn: &ExecutorTurn<'_>) -> ServiceResult<String>;
}

/// Capability tier of a generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Basic,
    Reasoning,
    Vision,
}

/// Generation services by tier. Missing tiers fall back to `basic`.
#[derive(Clone)]
pub struct ModelRegistry {
    basic: Arc<dyn GenerationService>,
    reasoning: Option<Arc<dyn GenerationService>>,
    vision: Option<Arc<dyn GenerationService>>,
}

impl ModelRegistry {
    pub fn new(basic: Arc<dyn GenerationService>) -> Self {
        Self {
            basic,
            reasoning: None,
            vision: None,
        }
    }

    pub fn with_reasoning(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.reasoning = Some(service);
        self
    }

    pub fn with_vision(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.vision = Some(service);
        self
    }

    pub fn get(&self, tier: ModelTier) -> Arc<dyn GenerationService> {
        let chosen = match tier {
            ModelTier::Basic => None,
            ModelTier::Reasoning => self.reasoning.as_ref(),
            ModelTier::Vision => self.vision.as_ref(),
        };
        Arc::clone(chosen.unwrap_or(&self.basic))
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("reasoning", &self.reasoning.is_some())
            .field("vision", &self.vision.is_some())
            .finish()
    }
}

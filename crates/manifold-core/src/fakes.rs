//! Deterministic in-memory collaborators (testing only).
//!
//! Provides `ScriptedGenerator`, `EchoGenerator`, `ScriptedDecider`,
//! `StaticCapability` and `EchoAgent`, which satisfy the service contracts
//! without any network.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::message::{latest_user_text, Message};
use crate::roles::executor::ExecutorTurn;
use crate::services::{
    Capability, ChunkStream, DecisionService, ExecutorAgent, GenerationChunk, GenerationService,
};

/// Turn a fixed list of chunks into a [`ChunkStream`].
pub fn scripted_stream(chunks: Vec<GenerationChunk>) -> ChunkStream {
    Box::pin(stream::iter(chunks.into_iter().map(Ok)))
}

/// Split text into chunks of at most `size` characters.
pub fn chunked(text: &str, size: usize) -> Vec<GenerationChunk> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| GenerationChunk::text(c.iter().collect::<String>()))
        .collect()
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Replays one scripted reply per `stream` call and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Vec<GenerationChunk>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as the given chunks.
    pub fn reply_chunks(self, chunks: Vec<GenerationChunk>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(chunks);
        self
    }

    /// Queue a reply delivered as chunks of the given texts.
    pub fn reply(self, chunks: &[&str]) -> Self {
        self.reply_chunks(chunks.iter().map(|c| GenerationChunk::text(*c)).collect())
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn stream(&self, messages: &[Message]) -> ServiceResult<ChunkStream> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ServiceError::Exhausted("generation".to_string()))?;
        Ok(scripted_stream(reply))
    }
}

// ---------------------------------------------------------------------------
// EchoGenerator
// ---------------------------------------------------------------------------

/// Streams the latest user text back in chunks of `size` characters, so
/// concurrent runs through one generator stay independent.
#[derive(Debug, Clone)]
pub struct EchoGenerator {
    size: usize,
}

impl EchoGenerator {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

#[async_trait]
impl GenerationService for EchoGenerator {
    async fn stream(&self, messages: &[Message]) -> ServiceResult<ChunkStream> {
        let text = latest_user_text(messages).unwrap_or_default();
        Ok(scripted_stream(chunked(&text, self.size)))
    }
}

// ---------------------------------------------------------------------------
// ScriptedDecider
// ---------------------------------------------------------------------------

/// Returns queued decision values in order; the last value repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    decisions: Mutex<VecDeque<Value>>,
    calls: Mutex<usize>,
}

impl ScriptedDecider {
    /// Decide `{"next": name}` for each name in turn.
    pub fn sequence(names: &[&str]) -> Self {
        Self::values(names.iter().map(|n| json!({ "next": n })).collect())
    }

    pub fn values(values: Vec<Value>) -> Self {
        Self {
            decisions: Mutex::new(values.into()),
            calls: Mutex::new(0),
        }
    }

    /// Number of decisions requested so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DecisionService for ScriptedDecider {
    async fn decide(&self, _messages: &[Message], _schema: &Value) -> ServiceResult<Value> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let mut decisions = self
            .decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match decisions.len() {
            0 => Err(ServiceError::Exhausted("decision".to_string())),
            1 => Ok(decisions[0].clone()),
            _ => Ok(decisions.pop_front().unwrap_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticCapability
// ---------------------------------------------------------------------------

/// Capability that always returns the same output or the same failure.
#[derive(Debug)]
pub struct StaticCapability {
    name: String,
    outcome: Result<String, String>,
    calls: Mutex<Vec<Value>>,
}

impl StaticCapability {
    pub fn ok(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: Ok(output.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: Err(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Inputs received so far.
    pub fn calls(&self) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: &Value) -> ServiceResult<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.clone());
        self.outcome
            .clone()
            .map_err(|reason| ServiceError::Capability {
                name: self.name.clone(),
                reason,
            })
    }
}

// ---------------------------------------------------------------------------
// EchoAgent
// ---------------------------------------------------------------------------

/// Executor agent that optionally calls one capability with the run's latest
/// user text and then answers with a fixed output (plus the capability result).
#[derive(Debug, Clone)]
pub struct EchoAgent {
    output: String,
    capability: Option<String>,
}

impl EchoAgent {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            capability: None,
        }
    }

    pub fn calling(mut self, capability: &str) -> Self {
        self.capability = Some(capability.to_string());
        self
    }
}

#[async_trait]
impl ExecutorAgent for EchoAgent {
    async fn invoke(&self, _messages: &[Message], turn: &ExecutorTurn<'_>) -> ServiceResult<String> {
        match &self.capability {
            Some(name) => {
                let query = turn.request().unwrap_or_default();
                let found = turn.call(name, json!({ "query": query })).await?;
                Ok(format!("{}\n{}", self.output, found))
            }
            None => Ok(self.output.clone()),
        }
    }
}

//! The execution event bus and the per-turn handle roles publish through.
//!
//! The bus is a bounded channel: a role awaits capacity before each chunk,
//! which is the only suspension point inside a turn and lets the translator
//! forward events before the next chunk is produced. Once the driver stops
//! listening, publishing becomes a no-op and the turn simply runs out.

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::events::{ExecutionEvent, ExecutionEventKind};
use crate::metrics::METRICS;
use crate::services::{Capability, ChunkStream};
use crate::team::RoleId;

/// Sending half of the execution bus for one run.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<ExecutionEvent>,
}

/// Create a bus with room for `capacity` in-flight events.
pub fn channel(capacity: usize) -> (EventBus, mpsc::Receiver<ExecutionEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventBus { tx }, rx)
}

impl EventBus {
    pub async fn publish(&self, event: ExecutionEvent) {
        if self.tx.send(event).await.is_err() {
            trace!("execution bus closed, dropping event");
        }
    }
}

/// Everything a role needs to report progress during one turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    bus: EventBus,
    role: RoleId,
    step: u32,
}

impl TurnContext {
    pub fn new(bus: EventBus, role: RoleId, step: u32) -> Self {
        Self { bus, role, step }
    }

    pub fn role(&self) -> &RoleId {
        &self.role
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub async fn emit(&self, kind: ExecutionEventKind) {
        self.bus
            .publish(ExecutionEvent {
                role: self.role.clone(),
                step: self.step,
                kind,
            })
            .await;
    }

    /// Drain a generation stream, publishing start/chunk/end events, and
    /// return the accumulated visible text.
    pub async fn stream_generation(&self, mut chunks: ChunkStream) -> ServiceResult<String> {
        let message_id = Uuid::new_v4().to_string();
        self.emit(ExecutionEventKind::GenerationStart {
            message_id: message_id.clone(),
        })
        .await;

        let mut full = String::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let text = chunk.text.unwrap_or_default();
            full.push_str(&text);
            self.emit(ExecutionEventKind::GenerationChunk {
                message_id: message_id.clone(),
                text,
                reasoning: chunk.reasoning,
            })
            .await;
        }

        self.emit(ExecutionEventKind::GenerationEnd { message_id }).await;
        Ok(full)
    }

    /// Invoke a capability, bracketing the call with start/end events. The
    /// call blocks the turn until the capability returns.
    pub async fn invoke_capability(
        &self,
        capability: &dyn Capability,
        input: Value,
    ) -> ServiceResult<String> {
        let call_id = Uuid::new_v4().to_string();
        let name = capability.name().to_string();
        self.emit(ExecutionEventKind::CapabilityStart {
            call_id: call_id.clone(),
            name: name.clone(),
            input: input.clone(),
        })
        .await;

        let result = capability.invoke(&input).await;
        METRICS.record_capability(result.is_ok());
        let output = result.map_err(|e| {
            warn!(role = %self.role, capability = %name, error = %e, "capability failed");
            e
        })?;

        self.emit(ExecutionEventKind::CapabilityEnd {
            call_id,
            name,
            output: output.clone(),
        })
        .await;
        Ok(output)
    }
}

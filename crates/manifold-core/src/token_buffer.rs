//! Intake control-marker interception.
//!
//! The intake reply either talks to the user or consists of the handoff
//! marker. The first chunks are held back until the buffer can tell the two
//! apart, so the marker never reaches the consumer. Each settled reply is
//! counted in [`METRICS`].

use crate::metrics::{IntakeOutcome, METRICS};

/// Number of chunks held before the buffer decides.
pub const BUFFER_CHUNKS: usize = 2;

/// Prefix of the handoff marker as it starts an intake reply.
pub const HANDOFF_PREFIX: &str = "handoff";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Buffering,
    Streaming,
    Suppressed,
}

/// Per-run buffer over visible intake chunks.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    chunks: Vec<String>,
    phase: Phase,
}

impl Default for TokenBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::with_capacity(BUFFER_CHUNKS),
            phase: Phase::Buffering,
        }
    }

    /// Feed one visible chunk and return the text to forward, if any.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        match self.phase {
            Phase::Suppressed => None,
            Phase::Streaming => Some(chunk.to_string()),
            Phase::Buffering => {
                self.chunks.push(chunk.to_string());
                let joined = self.chunks.concat();
                if joined.starts_with(HANDOFF_PREFIX) {
                    self.chunks.clear();
                    self.phase = Phase::Suppressed;
                    METRICS.record_intake(IntakeOutcome::HandedOff);
                    None
                } else if self.chunks.len() >= BUFFER_CHUNKS {
                    self.chunks.clear();
                    self.phase = Phase::Streaming;
                    METRICS.record_intake(IntakeOutcome::Streamed);
                    Some(joined)
                } else {
                    None
                }
            }
        }
    }

    /// Release whatever is still held back when the generation ends early.
    pub fn drain(&mut self) -> Option<String> {
        if self.phase != Phase::Buffering || self.chunks.is_empty() {
            return None;
        }
        let joined = self.chunks.concat();
        self.chunks.clear();
        self.phase = Phase::Streaming;
        METRICS.record_intake(IntakeOutcome::Drained);
        Some(joined)
    }

    pub fn handoff_detected(&self) -> bool {
        self.phase == Phase::Suppressed
    }
}

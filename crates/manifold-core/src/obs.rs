//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span to instrument the driver future with
//! - Emission functions for key lifecycle events: start, turn, finish, cancel, failure
//!
//! Events are emitted at `info!` level (configurable via `MANIFOLD_LOG`).
//! Per-turn diagnostics are `debug!` unless the run was started in debug mode.

use tracing::{debug, info, warn};

/// Span tagged with the run id; attach with `Instrument::instrument`.
pub fn run_span(run_id: &str, debug_mode: bool) -> tracing::Span {
    tracing::info_span!("manifold.run", run_id = %run_id, debug = debug_mode)
}

/// Emit event: run accepted with its input size and modes.
pub fn emit_run_started(run_id: &str, input_messages: usize, deep_thinking: bool, search: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        input_messages = input_messages,
        deep_thinking = deep_thinking,
        search_before_plan = search,
    );
}

/// Emit event: one role turn completed and its routing target.
pub fn emit_turn(
    run_id: &str,
    step: u32,
    role: &str,
    next: &str,
    history_len: usize,
    debug_mode: bool,
) {
    if debug_mode {
        info!(event = "run.turn", run_id = %run_id, step = step, role = %role, next = %next, history_len = history_len);
    } else {
        debug!(event = "run.turn", run_id = %run_id, step = step, role = %role, next = %next, history_len = history_len);
    }
}

/// Emit event: the plan text recorded by the planner.
pub fn emit_plan(run_id: &str, plan: &str, debug_mode: bool) {
    if debug_mode {
        info!(event = "run.plan", run_id = %run_id, plan = %plan);
    } else {
        debug!(event = "run.plan", run_id = %run_id, plan = %plan);
    }
}

/// Emit event: run reached the terminal state.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, turns: u32, events_forwarded: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        turns = turns,
        events_forwarded = events_forwarded,
    );
}

/// Emit event: consumer detached and the run stopped at a role boundary.
pub fn emit_run_cancelled(run_id: &str, turns: u32) {
    info!(event = "run.cancelled", run_id = %run_id, turns = turns);
}

/// Emit event: run aborted by a fatal error (warning level).
pub fn emit_run_failed(run_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, kind = %kind, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id", true);
        let _entered = span.enter();
        emit_turn("test-run-id", 1, "coordinator", "__end__", 1, true);
    }
}

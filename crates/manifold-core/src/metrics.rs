//! Process-wide routing counters.
//!
//! Counters are keyed by what the routing core does: runs by outcome,
//! failures by error kind, turns by role kind, intake buffer decisions and
//! capability calls. [`Metrics::snapshot`] reads everything at once and
//! [`Metrics::flush`] logs the snapshot as a single event, typically at
//! process exit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::driver::RunStatus;
use crate::team::{RoleId, DISPATCHER_NAME, INTAKE_NAME, PLANNER_NAME, REPORTER_NAME};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Role kinds turns are counted under. Every team member counts as
/// `executor` except the reporter.
pub const ROLE_KINDS: [&str; 5] = [INTAKE_NAME, PLANNER_NAME, DISPATCHER_NAME, "executor", REPORTER_NAME];

/// Error kinds failures are counted under; anything else lands in `other`.
pub const FAILURE_KINDS: [&str; 9] = [
    "input",
    "decision_contract",
    "illegal_transition",
    "unknown_role",
    "turn_limit",
    "capability",
    "service",
    "internal",
    "other",
];

/// How the intake buffer settled for one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The reply was user-facing and streamed after the held chunks.
    Streamed,
    /// The reply was the handoff marker and was suppressed.
    HandedOff,
    /// The reply ended while chunks were still held and was flushed whole.
    Drained,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Started,
    Completed,
    Cancelled,
    Failed,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_cancelled: u64,
    pub runs_failed: u64,
    pub turns: BTreeMap<&'static str, u64>,
    pub failures: BTreeMap<&'static str, u64>,
    pub intake_streamed: u64,
    pub intake_handed_off: u64,
    pub intake_drained: u64,
    pub capability_calls: u64,
    pub capability_failures: u64,
    pub events_forwarded: u64,
}

impl MetricsSnapshot {
    pub fn turns_total(&self) -> u64 {
        self.turns.values().sum()
    }

    pub fn turns_for(&self, kind: &str) -> u64 {
        self.turns.get(kind).copied().unwrap_or(0)
    }

    pub fn failures_for(&self, kind: &str) -> u64 {
        self.failures.get(kind).copied().unwrap_or(0)
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

pub struct Metrics {
    runs: [AtomicU64; 4],
    turns: [AtomicU64; ROLE_KINDS.len()],
    failures: [AtomicU64; FAILURE_KINDS.len()],
    intake: [AtomicU64; 3],
    capability_calls: AtomicU64,
    capability_failures: AtomicU64,
    events_forwarded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

fn role_slot(role: &RoleId) -> usize {
    match role {
        RoleId::Intake => 0,
        RoleId::Planner => 1,
        RoleId::Dispatcher => 2,
        RoleId::Executor(_) => 3,
        RoleId::Reporter => 4,
    }
}

fn failure_slot(kind: &str) -> usize {
    FAILURE_KINDS
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(FAILURE_KINDS.len() - 1)
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs: [ZERO; 4],
            turns: [ZERO; ROLE_KINDS.len()],
            failures: [ZERO; FAILURE_KINDS.len()],
            intake: [ZERO; 3],
            capability_calls: AtomicU64::new(0),
            capability_failures: AtomicU64::new(0),
            events_forwarded: AtomicU64::new(0),
        }
    }

    pub fn record_run_started(&self) {
        bump(&self.runs[Outcome::Started as usize]);
    }

    /// Count a stopped run under its outcome and, for failures, its kind.
    pub fn record_run_stopped(&self, status: &RunStatus) {
        let outcome = match status {
            RunStatus::Completed => Outcome::Completed,
            RunStatus::Cancelled => Outcome::Cancelled,
            RunStatus::Failed { kind, .. } => {
                bump(&self.failures[failure_slot(kind)]);
                Outcome::Failed
            }
        };
        bump(&self.runs[outcome as usize]);
        tracing::trace!(metric = "runs", ?outcome, "counter incremented");
    }

    pub fn record_turn(&self, role: &RoleId) {
        bump(&self.turns[role_slot(role)]);
    }

    pub fn record_intake(&self, outcome: IntakeOutcome) {
        bump(&self.intake[outcome as usize]);
        tracing::trace!(metric = "intake", ?outcome, "counter incremented");
    }

    pub fn record_capability(&self, succeeded: bool) {
        bump(&self.capability_calls);
        if !succeeded {
            bump(&self.capability_failures);
        }
    }

    pub fn record_event_forwarded(&self) {
        bump(&self.events_forwarded);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: read(&self.runs[Outcome::Started as usize]),
            runs_completed: read(&self.runs[Outcome::Completed as usize]),
            runs_cancelled: read(&self.runs[Outcome::Cancelled as usize]),
            runs_failed: read(&self.runs[Outcome::Failed as usize]),
            turns: ROLE_KINDS
                .iter()
                .zip(&self.turns)
                .map(|(kind, counter)| (*kind, read(counter)))
                .collect(),
            failures: FAILURE_KINDS
                .iter()
                .zip(&self.failures)
                .map(|(kind, counter)| (*kind, read(counter)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            intake_streamed: read(&self.intake[IntakeOutcome::Streamed as usize]),
            intake_handed_off: read(&self.intake[IntakeOutcome::HandedOff as usize]),
            intake_drained: read(&self.intake[IntakeOutcome::Drained as usize]),
            capability_calls: read(&self.capability_calls),
            capability_failures: read(&self.capability_failures),
            events_forwarded: read(&self.events_forwarded),
        }
    }

    /// Log the current snapshot as one `info!` event.
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            metric = "flush",
            runs_started = snapshot.runs_started,
            runs_completed = snapshot.runs_completed,
            runs_cancelled = snapshot.runs_cancelled,
            runs_failed = snapshot.runs_failed,
            turns_total = snapshot.turns_total(),
            turns = ?snapshot.turns,
            failures = ?snapshot.failures,
            intake_handed_off = snapshot.intake_handed_off,
            capability_calls = snapshot.capability_calls,
            capability_failures = snapshot.capability_failures,
            events_forwarded = snapshot.events_forwarded,
        );
    }

    /// Zero every counter.
    pub fn reset(&self) {
        let all = self
            .runs
            .iter()
            .chain(&self.turns)
            .chain(&self.failures)
            .chain(&self.intake)
            .chain([
                &self.capability_calls,
                &self.capability_failures,
                &self.events_forwarded,
            ]);
        for counter in all {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_are_counted_by_role_kind() {
        let m = Metrics::new();
        m.record_turn(&RoleId::Intake);
        m.record_turn(&RoleId::Dispatcher);
        m.record_turn(&RoleId::Executor("coder".into()));
        m.record_turn(&RoleId::Executor("researcher".into()));
        let snapshot = m.snapshot();
        assert_eq!(snapshot.turns_for("coordinator"), 1);
        assert_eq!(snapshot.turns_for("supervisor"), 1);
        assert_eq!(snapshot.turns_for("executor"), 2);
        assert_eq!(snapshot.turns_for("reporter"), 0);
        assert_eq!(snapshot.turns_total(), 4);
    }

    #[test]
    fn test_stopped_runs_split_by_outcome_and_kind() {
        let m = Metrics::new();
        m.record_run_started();
        m.record_run_started();
        m.record_run_started();
        m.record_run_stopped(&RunStatus::Completed);
        m.record_run_stopped(&RunStatus::Failed {
            kind: "capability".into(),
            message: "timeout".into(),
        });
        m.record_run_stopped(&RunStatus::Failed {
            kind: "novel".into(),
            message: "?".into(),
        });
        let snapshot = m.snapshot();
        assert_eq!(snapshot.runs_started, 3);
        assert_eq!(snapshot.runs_completed, 1);
        assert_eq!(snapshot.runs_failed, 2);
        assert_eq!(snapshot.failures_for("capability"), 1);
        assert_eq!(snapshot.failures_for("other"), 1);
        assert!(!snapshot.failures.contains_key("turn_limit"));
    }

    #[test]
    fn test_intake_and_capability_counters() {
        let m = Metrics::new();
        m.record_intake(IntakeOutcome::HandedOff);
        m.record_intake(IntakeOutcome::Streamed);
        m.record_capability(true);
        m.record_capability(false);
        let snapshot = m.snapshot();
        assert_eq!(snapshot.intake_handed_off, 1);
        assert_eq!(snapshot.intake_streamed, 1);
        assert_eq!(snapshot.intake_drained, 0);
        assert_eq!(snapshot.capability_calls, 2);
        assert_eq!(snapshot.capability_failures, 1);
    }

    #[test]
    fn test_reset_zeroes_all() {
        let m = Metrics::new();
        m.record_run_started();
        m.record_turn(&RoleId::Planner);
        m.record_event_forwarded();
        m.reset();
        let snapshot = m.snapshot();
        assert_eq!(snapshot, Metrics::new().snapshot());
        assert_eq!(snapshot.turns_total(), 0);
    }
}

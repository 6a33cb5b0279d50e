//! The run driver: one run end to end.
//!
//! The driver validates the request, spawns the routing machine on its own
//! task and pumps the execution bus through a per-run [`EventTranslator`]
//! into the consumer channel. When the consumer goes away it flips the
//! cancellation flag and stops listening; the machine finishes the role it
//! is in and stops at the next boundary. Dropping the driver future (or
//! aborting a spawned run) aborts the machine task outright.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::bus;
use crate::error::{RunError, RunResult};
use crate::events::ExternalEvent;
use crate::machine::RoutingStateMachine;
use crate::message::Message;
use crate::metrics::METRICS;
use crate::obs;
use crate::state::SharedRunState;
use crate::team::Team;
use crate::translator::EventTranslator;

/// Request to start a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default, alias = "deep_thinking_mode")]
    pub deep_thinking: bool,
    #[serde(default, alias = "search_before_planning")]
    pub search_before_plan: bool,
}

impl RunRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Single user message request.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text.into())])
    }

    pub fn with_modes(mut self, deep_thinking: bool, search_before_plan: bool) -> Self {
        self.deep_thinking = deep_thinking;
        self.search_before_plan = search_before_plan;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Reject requests no role could act on.
    pub fn validate(&self) -> RunResult<()> {
        if self.messages.is_empty() {
            return Err(RunError::EmptyInput);
        }
        Ok(())
    }
}

/// Channel sizes for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// In-flight execution events between a role and the translator.
    pub bus_capacity: usize,
    /// External events buffered for the consumer by [`RunDriver::spawn`].
    pub event_capacity: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            bus_capacity: 64,
            event_capacity: 256,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed { kind: String, message: String },
}

/// Summary returned once a run has fully stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Role turns completed; zero when the run failed.
    pub turns: u32,
    pub events_forwarded: u64,
}

/// A run executing on its own task.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: String,
    pub events: mpsc::Receiver<ExternalEvent>,
    pub task: JoinHandle<RunReport>,
}

#[derive(Debug, Clone)]
pub struct RunDriver {
    machine: RoutingStateMachine,
    settings: DriverSettings,
}

impl RunDriver {
    pub fn new(machine: RoutingStateMachine, settings: DriverSettings) -> Self {
        Self { machine, settings }
    }

    pub fn team(&self) -> &Arc<Team> {
        self.machine.roles().team()
    }

    pub fn settings(&self) -> DriverSettings {
        self.settings
    }

    /// Run to completion, forwarding external events to `consumer`.
    ///
    /// Only an invalid request is returned as an error; failures after the
    /// run started are reported on the stream and in the [`RunReport`].
    pub async fn drive(
        &self,
        request: RunRequest,
        consumer: mpsc::Sender<ExternalEvent>,
    ) -> RunResult<RunReport> {
        request.validate()?;
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, request.debug);
        Ok(self.execute(run_id, request, consumer).instrument(span).await)
    }

    /// Validate `request` and start it on a new task.
    pub fn spawn(self: &Arc<Self>, request: RunRequest) -> RunResult<RunHandle> {
        request.validate()?;
        let run_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.settings.event_capacity.max(1));
        let driver = Arc::clone(self);
        let span = obs::run_span(&run_id, request.debug);
        let task_run_id = run_id.clone();
        let task = tokio::spawn(
            async move { driver.execute(task_run_id, request, tx).await }.instrument(span),
        );
        Ok(RunHandle {
            run_id,
            events: rx,
            task,
        })
    }

    async fn execute(
        &self,
        run_id: String,
        request: RunRequest,
        consumer: mpsc::Sender<ExternalEvent>,
    ) -> RunReport {
        let started = Instant::now();
        METRICS.record_run_started();
        obs::emit_run_started(
            &run_id,
            request.messages.len(),
            request.deep_thinking,
            request.search_before_plan,
        );

        let team = Arc::clone(self.team());
        let state = SharedRunState::new(request.messages.clone(), Arc::clone(&team))
            .with_modes(request.deep_thinking, request.search_before_plan);
        let mut translator = EventTranslator::new(run_id.clone(), team, request.messages);

        let (bus, mut bus_rx) = bus::channel(self.settings.bus_capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let machine = self.machine.clone();
        let machine_run_id = run_id.clone();
        let debug_mode = request.debug;
        let mut machine_task = AbortOnDrop(tokio::spawn(
            async move {
                machine
                    .run(&machine_run_id, state, bus, cancel_rx, debug_mode)
                    .await
            }
            .in_current_span(),
        ));

        let mut forwarded = 0u64;
        let mut attached = true;
        'pump: loop {
            tokio::select! {
                received = bus_rx.recv() => {
                    let Some(event) = received else { break 'pump };
                    for external in translator.translate(event) {
                        if !forward(&consumer, external).await {
                            attached = false;
                            break 'pump;
                        }
                        forwarded += 1;
                        METRICS.record_event_forwarded();
                    }
                }
                _ = consumer.closed() => {
                    attached = false;
                    break 'pump;
                }
            }
        }

        if !attached {
            debug!("consumer detached, cancelling run");
            let _ = cancel_tx.send(true);
            drop(bus_rx);
        }

        let outcome = match (&mut machine_task.0).await {
            Ok(result) => result,
            Err(e) => Err(RunError::Internal(e.to_string())),
        };

        let (status, turns) = match outcome {
            Ok(outcome) if attached && !outcome.cancelled => {
                let end = ExternalEvent::WorkflowEnd {
                    workflow_id: run_id.clone(),
                    messages: outcome.state.messages,
                };
                if forward(&consumer, end).await {
                    forwarded += 1;
                    METRICS.record_event_forwarded();
                    (RunStatus::Completed, outcome.turns)
                } else {
                    (RunStatus::Cancelled, outcome.turns)
                }
            }
            Ok(outcome) => (RunStatus::Cancelled, outcome.turns),
            Err(e) => {
                let kind = e.kind().to_string();
                let message = e.to_string();
                obs::emit_run_failed(&run_id, &kind, &e);
                if attached {
                    let error = ExternalEvent::Error {
                        workflow_id: run_id.clone(),
                        kind: kind.clone(),
                        message: message.clone(),
                    };
                    if forward(&consumer, error).await {
                        forwarded += 1;
                        METRICS.record_event_forwarded();
                    }
                }
                (RunStatus::Failed { kind, message }, 0)
            }
        };

        match &status {
            RunStatus::Completed => obs::emit_run_finished(
                &run_id,
                started.elapsed().as_millis() as u64,
                turns,
                forwarded,
            ),
            RunStatus::Cancelled => obs::emit_run_cancelled(&run_id, turns),
            RunStatus::Failed { .. } => {}
        }
        METRICS.record_run_stopped(&status);

        RunReport {
            run_id,
            status,
            turns,
            events_forwarded: forwarded,
        }
    }
}

/// Owns a spawned task and aborts it when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Send one event if the consumer is still attached.
async fn forward(consumer: &mpsc::Sender<ExternalEvent>, event: ExternalEvent) -> bool {
    if consumer.is_closed() {
        return false;
    }
    consumer.send(event).await.is_ok()
}

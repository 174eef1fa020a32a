// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay attempts
//!
//! An attempt re-runs a workflow from the start against the run's recorded
//! events and commits exactly one outcome: a new request, a wake-up time, a
//! completion or a failure.

use crate::context::{History, RunContext, Verdict};
use crate::error::EngineError;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use replay_core::{
    payload, Clock, EventType, FailureReason, NewEvent, RunCompletedPayload, RunFailedPayload,
    RunKey,
};
use replay_storage::EventLog;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Instrument;

/// Why an attempt did not run the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No `RunCreated` event (yet)
    NotCreated,
    /// The run already has a terminal event
    Ended,
    /// The workflow is not registered in this process
    Unregistered,
    /// Another attempt for the run is in flight and will re-run
    Busy,
}

/// Result of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Skipped(SkipReason),
    Suspended {
        /// A new event was written
        appended: bool,
        /// The attempt wants to be re-run at this time
        wake_at: Option<DateTime<Utc>>,
    },
    Completed {
        recorded: bool,
    },
    Failed {
        reason: FailureReason,
        recorded: bool,
    },
}

impl AttemptOutcome {
    pub fn wake_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AttemptOutcome::Suspended { wake_at, .. } => *wake_at,
            _ => None,
        }
    }
}

/// A run ended; broadcast to local subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        run: RunKey,
        output: Value,
    },
    Failed {
        run: RunKey,
        reason: FailureReason,
        message: String,
    },
}

impl RunOutcome {
    pub fn run(&self) -> &RunKey {
        match self {
            RunOutcome::Completed { run, .. } | RunOutcome::Failed { run, .. } => run,
        }
    }
}

/// Runs replay attempts against a log
pub struct Replayer<L, B, C> {
    log: L,
    registry: Arc<Registry<B>>,
    clock: C,
    outcomes: broadcast::Sender<RunOutcome>,
}

impl<L, B, C> Replayer<L, B, C>
where
    L: EventLog,
    B: Send + Sync + 'static,
    C: Clock,
{
    pub fn new(
        log: L,
        registry: Arc<Registry<B>>,
        clock: C,
        outcomes: broadcast::Sender<RunOutcome>,
    ) -> Self {
        Self {
            log,
            registry,
            clock,
            outcomes,
        }
    }

    /// Replay `run` once
    pub async fn attempt(&self, run: &RunKey) -> Result<AttemptOutcome, EngineError> {
        let span = tracing::info_span!("attempt", run = %run);
        self.attempt_inner(run).instrument(span).await
    }

    async fn attempt_inner(&self, run: &RunKey) -> Result<AttemptOutcome, EngineError> {
        let events = self.log.load_run(run).await?;
        if events.iter().any(|e| e.kind.is_terminal()) {
            return Ok(AttemptOutcome::Skipped(SkipReason::Ended));
        }
        let Some(workflow) = self.registry.workflow(&run.namespace, &run.workflow).cloned() else {
            tracing::debug!("workflow not registered here");
            return Ok(AttemptOutcome::Skipped(SkipReason::Unregistered));
        };
        let history = match History::build(&events) {
            Ok(Some(history)) => history,
            Ok(None) => return Ok(AttemptOutcome::Skipped(SkipReason::NotCreated)),
            Err(e) => {
                let verdict = Verdict::Fail {
                    reason: FailureReason::Error,
                    message: format!("unreadable history: {e}"),
                };
                return self.commit(run, verdict).await;
            }
        };

        let start = std::time::Instant::now();
        let mut ctx = RunContext::new(run.clone(), history, self.clock.now());
        let args = ctx.args();
        let result = panic::catch_unwind(AssertUnwindSafe(|| workflow(&mut ctx, args)));
        let verdict = ctx.finish(result);

        let outcome = self.commit(run, verdict).await;
        match &outcome {
            Ok(outcome) => tracing::info!(
                events = events.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                outcome = ?outcome,
                "attempt finished"
            ),
            Err(e) => tracing::warn!(error = %e, "attempt could not commit"),
        }
        outcome
    }

    async fn commit(&self, run: &RunKey, verdict: Verdict) -> Result<AttemptOutcome, EngineError> {
        match verdict {
            Verdict::Suspend { append, wake_at } => {
                let appended = match append {
                    Some(event) => {
                        let kind = event.kind;
                        let applied = match self.log.append(event).await {
                            Ok(applied) => applied,
                            Err(e) if !e.is_transient() => {
                                let message = format!("{kind} could not be recorded: {e}");
                                return self.fail(run, FailureReason::Error, message).await;
                            }
                            Err(e) => return Err(e.into()),
                        };
                        if !applied {
                            tracing::debug!(%kind, "already recorded");
                        }
                        applied
                    }
                    None => false,
                };
                Ok(AttemptOutcome::Suspended { appended, wake_at })
            }
            Verdict::Complete(output) => {
                let completed = RunCompletedPayload {
                    output: output.clone(),
                };
                let event = NewEvent::new(
                    EventType::RunCompleted,
                    &run.event_key(),
                    payload::encode(&completed)?,
                );
                let recorded = self.log.append(event).await?;
                if recorded {
                    tracing::info!("run completed");
                    self.notify(RunOutcome::Completed {
                        run: run.clone(),
                        output,
                    });
                }
                Ok(AttemptOutcome::Completed { recorded })
            }
            Verdict::Fail { reason, message } => self.fail(run, reason, message).await,
        }
    }

    async fn fail(
        &self,
        run: &RunKey,
        reason: FailureReason,
        message: String,
    ) -> Result<AttemptOutcome, EngineError> {
        match reason {
            FailureReason::Determinism => tracing::error!(%message, "determinism violation"),
            FailureReason::Panic => tracing::error!(%message, "workflow panicked"),
            FailureReason::Error => tracing::warn!(%message, "workflow failed"),
        }
        let failed = RunFailedPayload {
            reason,
            message: message.clone(),
        };
        let event = NewEvent::new(
            EventType::RunFailed,
            &run.event_key(),
            payload::encode(&failed)?,
        );
        let recorded = self.log.append(event).await?;
        if recorded {
            self.notify(RunOutcome::Failed {
                run: run.clone(),
                reason,
                message,
            });
        }
        Ok(AttemptOutcome::Failed { reason, recorded })
    }

    fn notify(&self, outcome: RunOutcome) {
        // No subscribers is fine
        let _ = self.outcomes.send(outcome);
    }
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client operations: everything outside a workflow writes through here

use crate::error::EngineError;
use crate::replay::RunOutcome;
use crate::signal;
use replay_core::{
    payload, ActivityResult, EventKey, EventType, NewEvent, RunCompletedPayload,
    RunCreatedPayload, RunFailedPayload, RunKey, SleepDonePayload,
};
use replay_storage::EventLog;
use serde::Serialize;

/// Cheap to clone; usable from activity backends
#[derive(Clone)]
pub struct Client<L> {
    log: L,
}

impl<L: EventLog + Clone> Client<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Start a run. `false` if the run already exists.
    pub async fn run_workflow<A: Serialize + ?Sized>(
        &self,
        namespace: &str,
        workflow: &str,
        run: &str,
        args: &A,
    ) -> Result<bool, EngineError> {
        let key = RunKey::new(namespace, workflow, run);
        let created = RunCreatedPayload {
            args: payload::encode(args)?,
        };
        let event = NewEvent::new(
            EventType::RunCreated,
            &key.event_key(),
            payload::encode(&created)?,
        );
        let created = self.log.append(event).await?;
        tracing::info!(run = %key, created, "run workflow");
        Ok(created)
    }

    /// Deliver a signal. Re-sending with the same `external_id` is a no-op
    /// reported as `false`.
    pub async fn signal_run<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        workflow: &str,
        run: &str,
        kind: &str,
        value: &T,
        external_id: &str,
    ) -> Result<bool, EngineError> {
        let key = RunKey::new(namespace, workflow, run);
        let event = signal::received_event(&key, kind, value, external_id)?;
        let delivered = self.log.append(event).await?;
        tracing::debug!(run = %key, kind, external_id, delivered, "signal");
        Ok(delivered)
    }

    /// Record the response of activity call `(activity, index)` of a run
    pub async fn complete_activity(
        &self,
        namespace: &str,
        workflow: &str,
        run: &str,
        activity: &str,
        index: u32,
        result: ActivityResult,
    ) -> Result<bool, EngineError> {
        let key = RunKey::new(namespace, workflow, run).call_key(activity, index);
        self.respond(&key, result).await
    }

    /// Record the response of an activity that deferred its completion
    pub async fn complete_async_activity(
        &self,
        token: &str,
        result: ActivityResult,
    ) -> Result<bool, EngineError> {
        let key = EventKey::decode(token)?;
        if key.activity.is_none() || key.index.is_none() || key.is_sleep() {
            return Err(EngineError::InvalidToken(token.to_string()));
        }
        self.respond(&key, result).await
    }

    /// Mark the sleep identified by `key` as elapsed
    pub async fn complete_sleep(&self, key: &EventKey) -> Result<bool, EngineError> {
        let event = NewEvent::new(
            EventType::SleepDone,
            key,
            payload::encode(&SleepDonePayload {})?,
        );
        Ok(self.log.append(event).await?)
    }

    /// How the run ended, if it did
    pub async fn outcome(&self, run: &RunKey) -> Result<Option<RunOutcome>, EngineError> {
        let foreign_id = run.event_key().encode();
        if let Some(event) = self
            .log
            .lookup(&run.namespace, EventType::RunCompleted, &foreign_id)
            .await?
        {
            let completed: RunCompletedPayload = payload::decode(event.payload)?;
            return Ok(Some(RunOutcome::Completed {
                run: run.clone(),
                output: completed.output,
            }));
        }
        if let Some(event) = self
            .log
            .lookup(&run.namespace, EventType::RunFailed, &foreign_id)
            .await?
        {
            let failed: RunFailedPayload = payload::decode(event.payload)?;
            return Ok(Some(RunOutcome::Failed {
                run: run.clone(),
                reason: failed.reason,
                message: failed.message,
            }));
        }
        Ok(None)
    }

    async fn respond(&self, key: &EventKey, result: ActivityResult) -> Result<bool, EngineError> {
        let event = NewEvent::new(EventType::ActivityResponse, key, payload::encode(&result)?);
        Ok(self.log.append(event).await?)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

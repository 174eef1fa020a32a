// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity dispatcher
//!
//! Executes requested activities registered in this process and records their
//! responses.

use crate::error::EngineError;
use crate::registry::{ActivityFn, Registry};
use replay_core::{
    payload, ActivityRequestPayload, ActivityResult, Event, EventKey, EventType, NewEvent,
};
use replay_storage::EventLog;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Handed to every activity invocation
#[derive(Clone, Debug)]
pub struct ActivityContext {
    key: EventKey,
    cancellation: CancellationToken,
    deferred: Arc<AtomicBool>,
}

impl ActivityContext {
    pub(crate) fn new(key: EventKey, cancellation: CancellationToken) -> Self {
        Self {
            key,
            cancellation,
            deferred: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Identity of the request being served
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Fires when the engine shuts down
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Leave the response to an external party.
    ///
    /// Returns the token to pass to `Client::complete_async_activity`. The
    /// dispatcher records nothing when the activity then returns `Ok`.
    pub fn defer_completion(&self) -> String {
        self.deferred.store(true, Ordering::SeqCst);
        self.key.encode()
    }

    fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

/// What the dispatcher did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not registered in this process
    Unregistered,
    /// A response already exists (redelivery)
    AlreadyResponded,
    /// Executed; `recorded` is false if another response won the race
    Responded { recorded: bool, failed: bool },
    /// The activity deferred its completion
    Deferred,
}

/// Runs activity requests against the registry
pub struct ActivityDispatcher<L, B> {
    log: L,
    registry: Arc<Registry<B>>,
    backends: Arc<B>,
    cancellation: CancellationToken,
}

impl<L, B> ActivityDispatcher<L, B>
where
    L: EventLog,
    B: Send + Sync + 'static,
{
    pub fn new(
        log: L,
        registry: Arc<Registry<B>>,
        backends: Arc<B>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            log,
            registry,
            backends,
            cancellation,
        }
    }

    /// Serve one `ActivityRequest` event
    pub async fn dispatch(&self, request: &Event) -> Result<DispatchOutcome, EngineError> {
        let key = request.key()?;
        let name = key.activity.clone().unwrap_or_default();
        let Some(activity) = self.registry.activity(&key.namespace, &name).cloned() else {
            return Ok(DispatchOutcome::Unregistered);
        };

        let span = tracing::info_span!("activity", activity = %name, key = %key);
        self.serve(key, activity, request).instrument(span).await
    }

    async fn serve(
        &self,
        key: EventKey,
        activity: ActivityFn<B>,
        request: &Event,
    ) -> Result<DispatchOutcome, EngineError> {
        if self
            .log
            .lookup(&key.namespace, EventType::ActivityResponse, &request.foreign_id)
            .await?
            .is_some()
        {
            tracing::debug!("response already recorded");
            return Ok(DispatchOutcome::AlreadyResponded);
        }

        let ctx = ActivityContext::new(key.clone(), self.cancellation.child_token());
        let start = std::time::Instant::now();
        let result = match payload::decode::<ActivityRequestPayload>(request.payload.clone()) {
            Ok(requested) => {
                // Own task so a panicking activity becomes a failed response
                let call = activity(ctx.clone(), Arc::clone(&self.backends), requested.args);
                match tokio::spawn(call).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) if e.is_panic() => Err("activity panicked".to_string()),
                    Err(e) => Err(e.to_string()),
                }
            }
            Err(e) => Err(e.to_string()),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match result {
            Ok(_) if ctx.is_deferred() => {
                tracing::info!(elapsed_ms, "completion deferred");
                return Ok(DispatchOutcome::Deferred);
            }
            Ok(result) => {
                tracing::info!(elapsed_ms, "completed");
                ActivityResult::Completed { result }
            }
            Err(error) => {
                let cancelled = ctx.is_cancelled();
                tracing::warn!(elapsed_ms, cancelled, %error, "failed");
                ActivityResult::Failed { error, cancelled }
            }
        };
        let failed = matches!(result, ActivityResult::Failed { .. });

        let response = NewEvent::new(
            EventType::ActivityResponse,
            &key,
            payload::encode(&result)?,
        );
        let recorded = self.log.append(response).await?;
        Ok(DispatchOutcome::Responded { recorded, failed })
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer loops
//!
//! Each consumer reads one namespace from its durable cursor in batches. A
//! batch is handled as a whole: the cursor moves past it only once every event
//! in it was handled, otherwise the batch is retried with exponential backoff.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use replay_core::{Clock, Event, EventType, RunKey};
use replay_storage::{CursorStore, EventLog};
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-stream logic plugged into [`consume`]
#[async_trait]
pub(crate) trait BatchHandler: Send {
    /// Suffix of the cursor name, `<namespace>.<stream>`
    fn stream(&self) -> &'static str;

    async fn handle(&mut self, batch: &[Event]) -> Result<(), EngineError>;

    /// Periodic work, run after every batch and every idle wait
    async fn tick(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Earliest time `tick` has work to do
    fn next_wake(&mut self) -> Option<DateTime<Utc>> {
        None
    }
}

struct Progress {
    /// The batch was full; more events are likely waiting
    full: bool,
}

/// Run `handler` over `namespace` until `shutdown` fires
pub(crate) async fn consume<L, K, H, C>(
    log: &L,
    cursors: &K,
    namespace: &str,
    handler: &mut H,
    config: &EngineConfig,
    clock: &C,
    shutdown: CancellationToken,
) -> Result<(), EngineError>
where
    L: EventLog,
    K: CursorStore,
    H: BatchHandler,
    C: Clock,
{
    let name = format!("{}.{}", namespace, handler.stream());
    let span = tracing::info_span!("consumer", cursor = %name);
    consume_inner(log, cursors, namespace, &name, handler, config, clock, shutdown)
        .instrument(span)
        .await
}

#[allow(clippy::too_many_arguments)]
async fn consume_inner<L, K, H, C>(
    log: &L,
    cursors: &K,
    namespace: &str,
    name: &str,
    handler: &mut H,
    config: &EngineConfig,
    clock: &C,
    shutdown: CancellationToken,
) -> Result<(), EngineError>
where
    L: EventLog,
    K: CursorStore,
    H: BatchHandler,
    C: Clock,
{
    let mut head = log.subscribe();
    let mut head_open = true;
    let mut cursor = None;
    let mut backoff = config.retry_backoff;
    tracing::info!("consumer started");

    while !shutdown.is_cancelled() {
        // Appends after this point wake the idle wait below
        let _ = head.borrow_and_update();

        match step(log, cursors, namespace, name, handler, config, &mut cursor).await {
            Ok(progress) => {
                backoff = config.retry_backoff;
                if progress.full {
                    continue;
                }
                let wait = idle_wait(config.poll_interval, handler.next_wake(), clock);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = head.changed(), if head_open => {
                        if changed.is_err() {
                            head_open = false;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "batch failed, retrying"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = config.next_backoff(backoff);
            }
        }
    }

    tracing::info!("consumer stopped");
    Ok(())
}

async fn step<L, K, H>(
    log: &L,
    cursors: &K,
    namespace: &str,
    name: &str,
    handler: &mut H,
    config: &EngineConfig,
    cursor: &mut Option<u64>,
) -> Result<Progress, EngineError>
where
    L: EventLog,
    K: CursorStore,
    H: BatchHandler,
{
    let after = match *cursor {
        Some(seq) => seq,
        None => {
            let seq = cursors.get(name).await?;
            *cursor = Some(seq);
            seq
        }
    };

    let batch = log.read_after(namespace, after, config.batch_size).await?;
    if let Some(last) = batch.last().map(|e| e.seq) {
        handler.handle(&batch).await?;
        cursors.set(name, last).await?;
        *cursor = Some(last);
        tracing::debug!(events = batch.len(), cursor = last, "batch handled");
    }
    handler.tick().await?;

    Ok(Progress {
        full: batch.len() >= config.batch_size,
    })
}

fn idle_wait<C: Clock>(poll: Duration, wake: Option<DateTime<Utc>>, clock: &C) -> Duration {
    match wake {
        Some(at) => (at - clock.now()).to_std().unwrap_or(Duration::ZERO).min(poll),
        None => poll,
    }
}

/// Replays runs triggered by the namespace's events, wake-ups and recovery
pub(crate) struct WorkflowHandler<L, B, C> {
    engine: Engine<L, B, C>,
    namespace: String,
    recovered: bool,
}

impl<L, B, C> WorkflowHandler<L, B, C>
where
    L: EventLog + Clone,
    B: Send + Sync + 'static,
    C: Clock,
{
    pub(crate) fn new(engine: Engine<L, B, C>, namespace: &str) -> Self {
        Self {
            engine,
            namespace: namespace.to_string(),
            recovered: false,
        }
    }

    /// Replay `runs` concurrently; every run is attempted even if one fails
    async fn replay_all(&self, runs: Vec<RunKey>) -> Result<(), Vec<RunKey>> {
        let mut tasks = JoinSet::new();
        for run in runs {
            let engine = self.engine.clone();
            tasks.spawn(async move {
                let outcome = engine.replay(&run).await;
                (run, outcome)
            });
        }

        let mut failed = Vec::new();
        let mut lost = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((run, Err(e))) => {
                    tracing::warn!(run = %run, error = %e, "attempt failed");
                    failed.push(run);
                }
                Err(e) => {
                    // Workflow panics are caught inside the attempt
                    tracing::error!(error = %e, "attempt task failed");
                    lost = true;
                }
            }
        }
        if failed.is_empty() && !lost {
            Ok(())
        } else {
            Err(failed)
        }
    }

    async fn recover(&self) -> Result<(), EngineError> {
        let runs: Vec<RunKey> = self
            .engine
            .log()
            .runs(&self.namespace)
            .await?
            .into_iter()
            .filter(|status| !status.terminal)
            .map(|status| status.key)
            .collect();
        tracing::info!(runs = runs.len(), "recovering open runs");
        self.replay_all(runs)
            .await
            .map_err(|failed| EngineError::Attempts(failed.len()))
    }
}

#[async_trait]
impl<L, B, C> BatchHandler for WorkflowHandler<L, B, C>
where
    L: EventLog + Clone,
    B: Send + Sync + 'static,
    C: Clock,
{
    fn stream(&self) -> &'static str {
        "workflows"
    }

    async fn handle(&mut self, batch: &[Event]) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        let mut runs = Vec::new();
        for event in batch.iter().filter(|e| e.kind.triggers_replay()) {
            match event.run_key() {
                Ok(run) => {
                    if seen.insert(run.clone()) {
                        runs.push(run);
                    }
                }
                Err(e) => tracing::warn!(seq = event.seq, error = %e, "skipping event"),
            }
        }
        self.replay_all(runs)
            .await
            .map_err(|failed| EngineError::Attempts(failed.len()))
    }

    async fn tick(&mut self) -> Result<(), EngineError> {
        if !self.recovered {
            self.recover().await?;
            self.recovered = true;
        }

        let due = self.engine.due_wakeups(&self.namespace);
        if due.is_empty() {
            return Ok(());
        }
        if let Err(failed) = self.replay_all(due).await {
            // Try again on the next tick
            let now = self.engine.clock().now();
            for run in &failed {
                self.engine.schedule_wakeup(run, now);
            }
            return Err(EngineError::Attempts(failed.len()));
        }
        Ok(())
    }

    fn next_wake(&mut self) -> Option<DateTime<Utc>> {
        self.engine.next_wakeup(&self.namespace)
    }
}

/// Serves the namespace's activity requests
pub(crate) struct ActivityHandler<L, B, C> {
    engine: Engine<L, B, C>,
}

impl<L, B, C> ActivityHandler<L, B, C> {
    pub(crate) fn new(engine: Engine<L, B, C>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<L, B, C> BatchHandler for ActivityHandler<L, B, C>
where
    L: EventLog + Clone,
    B: Send + Sync + 'static,
    C: Clock,
{
    fn stream(&self) -> &'static str {
        "activities"
    }

    async fn handle(&mut self, batch: &[Event]) -> Result<(), EngineError> {
        let mut tasks = JoinSet::new();
        for event in batch.iter().filter(|e| e.kind == EventType::ActivityRequest) {
            let engine = self.engine.clone();
            let event = event.clone();
            tasks.spawn(async move { engine.dispatch(&event).await });
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "dispatch failed");
                    result = Err(e);
                }
                Err(e) => result = Err(e.into()),
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

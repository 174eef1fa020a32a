// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine: wires registry, log and clock into replay attempts, activity
//! dispatch and the per-namespace consumers

use crate::activity::{ActivityDispatcher, DispatchOutcome};
use crate::client::Client;
use crate::config::EngineConfig;
use crate::consumer::{self, ActivityHandler, WorkflowHandler};
use crate::error::EngineError;
use crate::gate::RunGate;
use crate::registry::Registry;
use crate::replay::{AttemptOutcome, Replayer, RunOutcome, SkipReason};
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use replay_core::{Clock, Event, RunKey, SystemClock};
use replay_storage::{CursorStore, EventLog};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of the completion broadcast; slow subscribers see `Lagged`
const OUTCOME_CAPACITY: usize = 256;

/// The replay engine. Cheap to clone; clones share all state.
pub struct Engine<L, B, C = SystemClock> {
    log: L,
    clock: C,
    config: EngineConfig,
    registry: Arc<Registry<B>>,
    replayer: Arc<Replayer<L, B, C>>,
    dispatcher: Arc<ActivityDispatcher<L, B>>,
    gate: RunGate,
    wakeups: Arc<Mutex<BTreeMap<String, Scheduler>>>,
    outcomes: broadcast::Sender<RunOutcome>,
    shutdown: CancellationToken,
}

impl<L: Clone, B, C: Clone> Clone for Engine<L, B, C> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            replayer: Arc::clone(&self.replayer),
            dispatcher: Arc::clone(&self.dispatcher),
            gate: self.gate.clone(),
            wakeups: Arc::clone(&self.wakeups),
            outcomes: self.outcomes.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<L, B, C> Engine<L, B, C>
where
    L: EventLog + Clone,
    B: Send + Sync + 'static,
    C: Clock,
{
    /// Build an engine; `registry` is frozen from here on
    pub fn new(log: L, registry: Registry<B>, backends: B, clock: C, config: EngineConfig) -> Self {
        let registry = Arc::new(registry);
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let shutdown = CancellationToken::new();
        let replayer = Replayer::new(
            log.clone(),
            Arc::clone(&registry),
            clock.clone(),
            outcomes.clone(),
        );
        let dispatcher = ActivityDispatcher::new(
            log.clone(),
            Arc::clone(&registry),
            Arc::new(backends),
            shutdown.clone(),
        );
        Self {
            log,
            clock,
            config,
            registry,
            replayer: Arc::new(replayer),
            dispatcher: Arc::new(dispatcher),
            gate: RunGate::new(),
            wakeups: Arc::new(Mutex::new(BTreeMap::new())),
            outcomes,
            shutdown,
        }
    }

    pub fn client(&self) -> Client<L> {
        Client::new(self.log.clone())
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<B> {
        &self.registry
    }

    /// Runs ended by this engine, as they end
    pub fn subscribe(&self) -> broadcast::Receiver<RunOutcome> {
        self.outcomes.subscribe()
    }

    /// Token cancelled by [`Engine::shutdown`]; activities get child tokens
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Replay `run` now.
    ///
    /// If an attempt for the run is already in flight this returns
    /// `Skipped(Busy)` and that attempt runs once more when it finishes.
    pub async fn replay(&self, run: &RunKey) -> Result<AttemptOutcome, EngineError> {
        if !self.gate.try_enter(run) {
            return Ok(AttemptOutcome::Skipped(SkipReason::Busy));
        }
        loop {
            let outcome = match self.replayer.attempt(run).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.gate.release(run);
                    return Err(e);
                }
            };
            self.track_wakeup(run, &outcome);
            if !self.gate.leave(run) {
                return Ok(outcome);
            }
        }
    }

    /// Serve one `ActivityRequest` event
    pub async fn dispatch(&self, request: &Event) -> Result<DispatchOutcome, EngineError> {
        self.dispatcher.dispatch(request).await
    }

    /// Spawn the workflow and activity consumers of every registered namespace
    pub fn start<K>(&self, cursors: K) -> JoinSet<Result<(), EngineError>>
    where
        K: CursorStore + Clone,
    {
        let mut tasks = JoinSet::new();
        for namespace in self.registry.workflow_namespaces() {
            let engine = self.clone();
            let cursors = cursors.clone();
            tasks.spawn(async move { engine.run_workflows(&namespace, cursors).await });
        }
        for namespace in self.registry.activity_namespaces() {
            let engine = self.clone();
            let cursors = cursors.clone();
            tasks.spawn(async move { engine.run_activities(&namespace, cursors).await });
        }
        tasks
    }

    /// Workflow consumer for `namespace`; returns on shutdown
    pub async fn run_workflows<K: CursorStore>(
        &self,
        namespace: &str,
        cursors: K,
    ) -> Result<(), EngineError> {
        let mut handler = WorkflowHandler::new(self.clone(), namespace);
        consumer::consume(
            &self.log,
            &cursors,
            namespace,
            &mut handler,
            &self.config,
            &self.clock,
            self.shutdown.clone(),
        )
        .await
    }

    /// Activity consumer for `namespace`; returns on shutdown
    pub async fn run_activities<K: CursorStore>(
        &self,
        namespace: &str,
        cursors: K,
    ) -> Result<(), EngineError> {
        let mut handler = ActivityHandler::new(self.clone());
        consumer::consume(
            &self.log,
            &cursors,
            namespace,
            &mut handler,
            &self.config,
            &self.clock,
            self.shutdown.clone(),
        )
        .await
    }

    fn track_wakeup(&self, run: &RunKey, outcome: &AttemptOutcome) {
        let mut wakeups = self.wakeups.lock().unwrap_or_else(|e| e.into_inner());
        let scheduler = wakeups.entry(run.namespace.clone()).or_default();
        match outcome.wake_at() {
            Some(at) => scheduler.schedule(run.clone(), at),
            None => scheduler.cancel(run),
        }
    }

    pub(crate) fn schedule_wakeup(&self, run: &RunKey, at: DateTime<Utc>) {
        let mut wakeups = self.wakeups.lock().unwrap_or_else(|e| e.into_inner());
        wakeups
            .entry(run.namespace.clone())
            .or_default()
            .schedule(run.clone(), at);
    }

    pub(crate) fn due_wakeups(&self, namespace: &str) -> Vec<RunKey> {
        let now = self.clock.now();
        let mut wakeups = self.wakeups.lock().unwrap_or_else(|e| e.into_inner());
        wakeups
            .get_mut(namespace)
            .map(|scheduler| scheduler.poll(now))
            .unwrap_or_default()
    }

    /// Earliest pending wake-up of `namespace`
    pub fn next_wakeup(&self, namespace: &str) -> Option<DateTime<Utc>> {
        let mut wakeups = self.wakeups.lock().unwrap_or_else(|e| e.into_inner());
        wakeups
            .get_mut(namespace)
            .and_then(|scheduler| scheduler.next_deadline())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

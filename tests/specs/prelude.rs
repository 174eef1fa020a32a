// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: an engine with running consumers over a chosen log

pub use replay_core::{EventType, FailureReason, NewEvent, RunKey, SystemClock};
pub use replay_engine::{
    ActivityContext, ActivityError, AttemptOutcome, Client, Engine, EngineConfig, EngineError,
    MemorySleepStore, ReadyCheck, Registry, RunContext, RunError, RunOutcome, SkipReason,
    SleepConfig, SleepService,
};
pub use replay_storage::{EventLog, FileCursorStore, FileLog, MemoryCursorStore, MemoryLog};
pub use serde_json::json;
pub use std::sync::atomic::{AtomicUsize, Ordering};
pub use std::sync::Arc;
pub use std::time::Duration;

use replay_storage::CursorStore;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

pub const NS: &str = "ns";

/// Handed to every activity: a client for signalling and an invocation counter
pub struct Backends<L> {
    pub client: Client<L>,
    pub calls: Arc<AtomicUsize>,
}

/// Bumps the invocation counter and returns its previous value
pub async fn tick<L>(_: ActivityContext, b: Arc<Backends<L>>, _: ()) -> Result<usize, ActivityError> {
    Ok(b.calls.fetch_add(1, Ordering::SeqCst))
}

pub struct World<L: EventLog + Clone> {
    pub engine: Engine<L, Backends<L>>,
    pub calls: Arc<AtomicUsize>,
    tasks: JoinSet<Result<(), EngineError>>,
    outcomes: broadcast::Receiver<RunOutcome>,
}

impl World<Arc<MemoryLog>> {
    pub fn start(registry: Registry<Backends<Arc<MemoryLog>>>) -> Self {
        World::on(
            Arc::new(MemoryLog::new()),
            MemoryCursorStore::new(),
            registry,
            Arc::new(AtomicUsize::new(0)),
        )
    }
}

impl<L: EventLog + Clone> World<L> {
    /// Start every consumer of `registry` over `log`
    pub fn on<K: CursorStore + Clone>(
        log: L,
        cursors: K,
        registry: Registry<Backends<L>>,
        calls: Arc<AtomicUsize>,
    ) -> Self {
        let backends = Backends {
            client: Client::new(log.clone()),
            calls: Arc::clone(&calls),
        };
        let config = EngineConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_retry_backoff(Duration::from_millis(5), Duration::from_millis(20));
        let engine = Engine::new(log, registry, backends, SystemClock, config);
        let outcomes = engine.subscribe();
        let tasks = engine.start(cursors);
        Self {
            engine,
            calls,
            tasks,
            outcomes,
        }
    }

    /// Also run a sleep service for [`NS`] that completes every sleep at once
    pub fn with_instant_sleeps(mut self) -> Self {
        let service = SleepService::new(
            self.engine.log().clone(),
            MemorySleepStore::new(),
            SystemClock,
            SleepConfig {
                poll_period: Duration::from_millis(10),
            },
        )
        .with_ready_check(ReadyCheck::Always);
        let config = self.engine.config().clone();
        let shutdown = self.engine.shutdown_token();
        self.tasks.spawn(async move {
            service
                .run(NS, MemoryCursorStore::new(), &config, shutdown)
                .await
        });
        self
    }

    pub fn client(&self) -> Client<L> {
        self.engine.client()
    }

    /// Start `workflow` as run `run` and wait for it to end
    pub async fn run<A: serde::Serialize>(&mut self, workflow: &str, run: &str, args: A) -> RunOutcome {
        self.client()
            .run_workflow(NS, workflow, run, &args)
            .await
            .unwrap();
        self.wait(&RunKey::new(NS, workflow, run)).await
    }

    pub async fn wait(&mut self, run: &RunKey) -> RunOutcome {
        let outcomes = &mut self.outcomes;
        let wait = async {
            loop {
                let outcome = outcomes.recv().await.unwrap();
                if outcome.run() == run {
                    return outcome;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(20), wait)
            .await
            .expect("run did not end in time")
    }

    pub async fn events(&self) -> Vec<replay_core::Event> {
        self.engine.log().read_after(NS, 0, usize::MAX).await.unwrap()
    }

    pub async fn count(&self, kind: EventType) -> usize {
        self.events().await.iter().filter(|e| e.kind == kind).count()
    }

    /// Poll until `kind` has been stored `n` times
    pub async fn wait_for_count(&self, kind: EventType, n: usize) {
        let wait = async {
            while self.count(kind).await < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(20), wait)
            .await
            .expect("events did not appear in time");
    }

    pub fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn stop(mut self) {
        self.engine.shutdown();
        while let Some(joined) = self.tasks.join_next().await {
            joined.unwrap().unwrap();
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sleep service
//!
//! Records every `SleepRequest` of a namespace with its deadline and, on a
//! fixed poll period, completes the ones that are due. Runs as its own task;
//! workflows only ever see the resulting `SleepDone` events.

use crate::client::Client;
use crate::config::{EngineConfig, SleepConfig};
use crate::consumer::{self, BatchHandler};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use replay_core::{payload, Clock, Event, EventKey, EventType, SleepRequestPayload, SystemClock};
use replay_storage::{CursorStore, EventLog};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SleepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pending sleeps by foreign id
#[async_trait]
pub trait SleepStore: Send + Sync + 'static {
    /// Record a sleep; recording the same id again keeps the first deadline
    async fn insert(&self, foreign_id: &str, deadline: DateTime<Utc>) -> Result<(), SleepError>;
    async fn remove(&self, foreign_id: &str) -> Result<(), SleepError>;
    /// Every pending sleep, earliest deadline first
    async fn pending(&self) -> Result<Vec<(String, DateTime<Utc>)>, SleepError>;
}

#[async_trait]
impl<S: SleepStore + ?Sized> SleepStore for Arc<S> {
    async fn insert(&self, foreign_id: &str, deadline: DateTime<Utc>) -> Result<(), SleepError> {
        (**self).insert(foreign_id, deadline).await
    }

    async fn remove(&self, foreign_id: &str) -> Result<(), SleepError> {
        (**self).remove(foreign_id).await
    }

    async fn pending(&self) -> Result<Vec<(String, DateTime<Utc>)>, SleepError> {
        (**self).pending().await
    }
}

fn sorted(sleeps: &BTreeMap<String, DateTime<Utc>>) -> Vec<(String, DateTime<Utc>)> {
    let mut pending: Vec<_> = sleeps.iter().map(|(k, v)| (k.clone(), *v)).collect();
    pending.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    pending
}

#[derive(Clone, Default)]
pub struct MemorySleepStore {
    sleeps: Arc<Mutex<BTreeMap<String, DateTime<Utc>>>>,
}

impl MemorySleepStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SleepStore for MemorySleepStore {
    async fn insert(&self, foreign_id: &str, deadline: DateTime<Utc>) -> Result<(), SleepError> {
        let mut sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        sleeps.entry(foreign_id.to_string()).or_insert(deadline);
        Ok(())
    }

    async fn remove(&self, foreign_id: &str) -> Result<(), SleepError> {
        let mut sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        sleeps.remove(foreign_id);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<(String, DateTime<Utc>)>, SleepError> {
        let sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sorted(&sleeps))
    }
}

/// Sleep store persisted as one JSON document, replaced atomically on change
pub struct FileSleepStore {
    path: PathBuf,
    sleeps: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl FileSleepStore {
    pub fn open(path: &Path) -> Result<Self, SleepError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let sleeps = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            sleeps: Mutex::new(sleeps),
        })
    }

    fn persist(&self, sleeps: &BTreeMap<String, DateTime<Utc>>) -> Result<(), SleepError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(sleeps)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl SleepStore for FileSleepStore {
    async fn insert(&self, foreign_id: &str, deadline: DateTime<Utc>) -> Result<(), SleepError> {
        let mut sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        if sleeps.contains_key(foreign_id) {
            return Ok(());
        }
        sleeps.insert(foreign_id.to_string(), deadline);
        self.persist(&sleeps)
    }

    async fn remove(&self, foreign_id: &str) -> Result<(), SleepError> {
        let mut sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        if sleeps.remove(foreign_id).is_some() {
            self.persist(&sleeps)?;
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<(String, DateTime<Utc>)>, SleepError> {
        let sleeps = self.sleeps.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sorted(&sleeps))
    }
}

/// When a pending sleep counts as elapsed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadyCheck {
    /// Once its deadline has passed
    #[default]
    Deadline,
    /// Immediately; for tests that should not wait out real sleeps
    Always,
}

impl ReadyCheck {
    pub fn is_ready(self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            ReadyCheck::Deadline => deadline <= now,
            ReadyCheck::Always => true,
        }
    }
}

/// Completes durable sleeps for one namespace
pub struct SleepService<L, S, C = SystemClock> {
    client: Client<L>,
    store: S,
    clock: C,
    ready: ReadyCheck,
    config: SleepConfig,
}

impl<L, S, C> SleepService<L, S, C>
where
    L: EventLog + Clone,
    S: SleepStore,
    C: Clock,
{
    pub fn new(log: L, store: S, clock: C, config: SleepConfig) -> Self {
        Self {
            client: Client::new(log),
            store,
            clock,
            ready: ReadyCheck::default(),
            config,
        }
    }

    pub fn with_ready_check(mut self, ready: ReadyCheck) -> Self {
        self.ready = ready;
        self
    }

    /// Record a `SleepRequest`; other events are ignored
    pub async fn record(&self, event: &Event) -> Result<(), EngineError> {
        if event.kind != EventType::SleepRequest {
            return Ok(());
        }
        let request: SleepRequestPayload = payload::decode(event.payload.clone())?;
        let deadline = event
            .created_at
            .checked_add_signed(chrono::Duration::milliseconds(
                i64::try_from(request.duration_ms).unwrap_or(i64::MAX),
            ))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.store.insert(&event.foreign_id, deadline).await?;
        tracing::debug!(foreign_id = %event.foreign_id, %deadline, "sleep recorded");
        Ok(())
    }

    /// Complete every due sleep; returns how many were completed
    pub async fn complete_due(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut completed = 0;
        for (foreign_id, deadline) in self.store.pending().await? {
            if !self.ready.is_ready(deadline, now) {
                // Pending sleeps come earliest first
                break;
            }
            let key = EventKey::decode(&foreign_id)?;
            let recorded = self.client.complete_sleep(&key).await?;
            self.store.remove(&foreign_id).await?;
            tracing::info!(key = %key, recorded, "sleep done");
            completed += 1;
        }
        Ok(completed)
    }

    /// Consume `namespace` until `shutdown` fires
    pub async fn run<K: CursorStore>(
        self,
        namespace: &str,
        cursors: K,
        engine: &EngineConfig,
        shutdown: CancellationToken,
    ) -> Result<(), EngineError> {
        let config = engine.clone().with_poll_interval(self.config.poll_period);
        let log = self.client.log().clone();
        let clock = self.clock.clone();
        let mut handler = SleepHandler { service: self };
        consumer::consume(&log, &cursors, namespace, &mut handler, &config, &clock, shutdown).await
    }

    pub fn poll_period(&self) -> Duration {
        self.config.poll_period
    }
}

struct SleepHandler<L, S, C> {
    service: SleepService<L, S, C>,
}

#[async_trait]
impl<L, S, C> BatchHandler for SleepHandler<L, S, C>
where
    L: EventLog + Clone,
    S: SleepStore,
    C: Clock,
{
    fn stream(&self) -> &'static str {
        "sleeps"
    }

    async fn handle(&mut self, batch: &[Event]) -> Result<(), EngineError> {
        for event in batch {
            self.service.record(event).await?;
        }
        Ok(())
    }

    async fn tick(&mut self) -> Result<(), EngineError> {
        self.service.complete_due().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "sleep_tests.rs"]
mod tests;

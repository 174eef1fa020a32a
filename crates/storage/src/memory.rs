// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event log

use crate::index::{Admission, LogIndex};
use crate::log::{EventLog, LogError, RunStatus};
use async_trait::async_trait;
use replay_core::{Clock, Event, EventType, NewEvent, RunKey, SystemClock};
use std::sync::Mutex;
use tokio::sync::watch;

/// Event log held entirely in memory.
///
/// Offers the same ordering and uniqueness guarantees as [`crate::FileLog`] but
/// loses everything on drop.
pub struct MemoryLog<C = SystemClock> {
    index: Mutex<LogIndex>,
    head: watch::Sender<u64>,
    clock: C,
}

impl MemoryLog<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryLog<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryLog<C> {
    /// Create a log whose event timestamps come from `clock`
    pub fn with_clock(clock: C) -> Self {
        let (head, _) = watch::channel(0);
        Self {
            index: Mutex::new(LogIndex::default()),
            head,
            clock,
        }
    }

    /// Snapshot of every event, in log order
    pub fn events(&self) -> Vec<Event> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.all_events()
    }
}

#[async_trait]
impl<C: Clock> EventLog for MemoryLog<C> {
    async fn append(&self, event: NewEvent) -> Result<bool, LogError> {
        let seq = {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let run = match index.check(&event)? {
                Admission::Admit(run) => run,
                Admission::Duplicate | Admission::RunEnded | Admission::Unrequested => {
                    return Ok(false)
                }
            };
            let seq = index.head() + 1;
            index.apply(event.into_event(seq, self.clock.now()), run);
            seq
        };
        self.head.send_replace(seq);
        Ok(true)
    }

    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        Ok(index.read_after(namespace, after, limit))
    }

    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        Ok(index.load_run(run))
    }

    async fn lookup(
        &self,
        namespace: &str,
        kind: EventType,
        foreign_id: &str,
    ) -> Result<Option<Event>, LogError> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        Ok(index.lookup(namespace, kind, foreign_id))
    }

    async fn runs(&self, namespace: &str) -> Result<Vec<RunStatus>, LogError> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        Ok(index.runs(namespace))
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

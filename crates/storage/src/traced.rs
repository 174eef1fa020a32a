// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced log wrapper for consistent observability

use crate::log::{EventLog, LogError, RunStatus};
use async_trait::async_trait;
use replay_core::{Event, EventType, NewEvent, RunKey};
use tokio::sync::watch;

/// Wrapper that adds tracing to any EventLog
#[derive(Clone)]
pub struct TracedEventLog<L> {
    inner: L,
}

impl<L> TracedEventLog<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: EventLog> EventLog for TracedEventLog<L> {
    async fn append(&self, event: NewEvent) -> Result<bool, LogError> {
        let span = tracing::debug_span!(
            "log.append",
            namespace = %event.namespace,
            kind = %event.kind,
        );
        let _guard = span.enter();
        let foreign_id = event.foreign_id.clone();

        let start = std::time::Instant::now();
        let result = self.inner.append(event).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(true) => tracing::debug!(
                foreign_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "appended"
            ),
            // Duplicates are routine under replay; not an error
            Ok(false) => tracing::debug!(foreign_id, "not applied (duplicate or run ended)"),
            Err(e) => tracing::error!(
                foreign_id,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "append failed"
            ),
        }

        result
    }

    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError> {
        let result = self.inner.read_after(namespace, after, limit).await;
        match &result {
            Ok(events) => tracing::trace!(namespace, after, count = events.len(), "read"),
            Err(e) => tracing::warn!(namespace, after, error = %e, "read failed"),
        }
        result
    }

    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError> {
        let result = self.inner.load_run(run).await;
        tracing::trace!(run = %run, count = result.as_ref().map(|e| e.len()).ok(), "loaded run");
        result
    }

    async fn lookup(
        &self,
        namespace: &str,
        kind: EventType,
        foreign_id: &str,
    ) -> Result<Option<Event>, LogError> {
        self.inner.lookup(namespace, kind, foreign_id).await
    }

    async fn runs(&self, namespace: &str) -> Result<Vec<RunStatus>, LogError> {
        self.inner.runs(namespace).await
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }
}

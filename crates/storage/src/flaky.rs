// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log wrapper that injects failures for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::log::{EventLog, LogError, RunStatus};
use async_trait::async_trait;
use replay_core::{Event, EventType, KeyError, NewEvent, RunKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Fails a configurable number of upcoming appends or reads, then behaves
/// like the wrapped log
#[derive(Clone)]
pub struct FlakyLog<L> {
    inner: L,
    failing_appends: Arc<AtomicUsize>,
    failing_reads: Arc<AtomicUsize>,
    rejected_appends: Arc<AtomicUsize>,
}

impl<L> FlakyLog<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            failing_appends: Arc::new(AtomicUsize::new(0)),
            failing_reads: Arc::new(AtomicUsize::new(0)),
            rejected_appends: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `n` appends fail
    pub fn fail_appends(&self, n: usize) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reads (`read_after` / `load_run`) fail
    pub fn fail_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` appends fail with an error retrying cannot clear
    pub fn reject_appends(&self, n: usize) {
        self.rejected_appends.store(n, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<L: EventLog> EventLog for FlakyLog<L> {
    async fn append(&self, event: NewEvent) -> Result<bool, LogError> {
        if Self::take(&self.failing_appends) {
            return Err(LogError::Unavailable("injected append failure".to_string()));
        }
        if Self::take(&self.rejected_appends) {
            return Err(LogError::Key(KeyError::EmptyField("activity")));
        }
        self.inner.append(event).await
    }

    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError> {
        if Self::take(&self.failing_reads) {
            return Err(LogError::Unavailable("injected read failure".to_string()));
        }
        self.inner.read_after(namespace, after, limit).await
    }

    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError> {
        if Self::take(&self.failing_reads) {
            return Err(LogError::Unavailable("injected read failure".to_string()));
        }
        self.inner.load_run(run).await
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

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event log interface the engine is written against

use async_trait::async_trait;
use replay_core::{Event, EventType, KeyError, NewEvent, RunKey};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur in event log operations
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid event key: {0}")]
    Key(#[from] KeyError),
    #[error("log unavailable: {0}")]
    Unavailable(String),
}

impl LogError {
    /// Retrying the same append may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::Io(_) | LogError::Unavailable(_))
    }
}

/// A run known to the log and whether it has ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub key: RunKey,
    pub terminal: bool,
}

/// Durable, ordered, append-only event log.
///
/// Appends are idempotent on `(namespace, dedup class, foreign id)`: a duplicate
/// returns `Ok(false)`, as does any append for a run that already ended.
#[async_trait]
pub trait EventLog: Send + Sync + 'static {
    /// Append an event; `Ok(false)` means it was not applied
    async fn append(&self, event: NewEvent) -> Result<bool, LogError>;

    /// Events of `namespace` with `seq > after`, in log order, at most `limit`
    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError>;

    /// All events of one run, in log order
    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError>;

    /// Find the event stored under a foreign id
    async fn lookup(
        &self,
        namespace: &str,
        kind: EventType,
        foreign_id: &str,
    ) -> Result<Option<Event>, LogError>;

    /// Every run of `namespace` that has at least one event
    async fn runs(&self, namespace: &str) -> Result<Vec<RunStatus>, LogError>;

    /// Watch the sequence number of the latest appended event
    fn subscribe(&self) -> watch::Receiver<u64>;
}

#[async_trait]
impl<L: EventLog + ?Sized> EventLog for Arc<L> {
    async fn append(&self, event: NewEvent) -> Result<bool, LogError> {
        (**self).append(event).await
    }

    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError> {
        (**self).read_after(namespace, after, limit).await
    }

    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError> {
        (**self).load_run(run).await
    }

    async fn lookup(
        &self,
        namespace: &str,
        kind: EventType,
        foreign_id: &str,
    ) -> Result<Option<Event>, LogError> {
        (**self).lookup(namespace, kind, foreign_id).await
    }

    async fn runs(&self, namespace: &str) -> Result<Vec<RunStatus>, LogError> {
        (**self).runs(namespace).await
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        (**self).subscribe()
    }
}

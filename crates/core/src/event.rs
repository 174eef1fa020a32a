// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event log model
//!
//! The event log is the only persisted entity. A run is the ordered subsequence
//! of events sharing a [`RunKey`]; its state is always recomputed from them.

use crate::key::{EventKey, KeyError, RunKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type of a logged event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    RunCreated,
    ActivityRequest,
    ActivityResponse,
    Signal,
    SleepRequest,
    SleepDone,
    RunCompleted,
    RunFailed,
}

/// Uniqueness class of an event type.
///
/// The log rejects a second event with the same `(namespace, class, foreign_id)`.
/// Both terminal types share a class so a run ends exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DedupClass {
    Created,
    ActivityRequest,
    ActivityResponse,
    Signal,
    SleepRequest,
    SleepDone,
    Terminal,
}

impl EventType {
    pub fn dedup_class(self) -> DedupClass {
        match self {
            EventType::RunCreated => DedupClass::Created,
            EventType::ActivityRequest => DedupClass::ActivityRequest,
            EventType::ActivityResponse => DedupClass::ActivityResponse,
            EventType::Signal => DedupClass::Signal,
            EventType::SleepRequest => DedupClass::SleepRequest,
            EventType::SleepDone => DedupClass::SleepDone,
            EventType::RunCompleted | EventType::RunFailed => DedupClass::Terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventType::RunCompleted | EventType::RunFailed)
    }

    /// Class of the request a response answers; responses share its foreign id
    pub fn answers(self) -> Option<DedupClass> {
        match self {
            EventType::ActivityResponse => Some(DedupClass::ActivityRequest),
            EventType::SleepDone => Some(DedupClass::SleepRequest),
            _ => None,
        }
    }

    /// Events that can unblock a suspended run
    pub fn triggers_replay(self) -> bool {
        matches!(
            self,
            EventType::RunCreated
                | EventType::ActivityResponse
                | EventType::Signal
                | EventType::SleepDone
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            EventType::RunCreated => "run:created",
            EventType::ActivityRequest => "activity:request",
            EventType::ActivityResponse => "activity:response",
            EventType::Signal => "signal",
            EventType::SleepRequest => "sleep:request",
            EventType::SleepDone => "sleep:done",
            EventType::RunCompleted => "run:completed",
            EventType::RunFailed => "run:failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event that has not been appended yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub namespace: String,
    pub kind: EventType,
    pub foreign_id: String,
    pub payload: Value,
}

impl NewEvent {
    pub fn new(kind: EventType, key: &EventKey, payload: Value) -> Self {
        Self {
            namespace: key.namespace.clone(),
            kind,
            foreign_id: key.encode(),
            payload,
        }
    }

    pub fn key(&self) -> Result<EventKey, KeyError> {
        EventKey::decode(&self.foreign_id)
    }

    /// Stamp with the log position and creation time assigned at append
    pub fn into_event(self, seq: u64, created_at: DateTime<Utc>) -> Event {
        Event {
            seq,
            namespace: self.namespace,
            kind: self.kind,
            foreign_id: self.foreign_id,
            payload: self.payload,
            created_at,
        }
    }
}

/// An immutable record in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Log position, strictly increasing across the whole log
    pub seq: u64,
    pub namespace: String,
    pub kind: EventType,
    /// Encoded [`EventKey`]
    pub foreign_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn key(&self) -> Result<EventKey, KeyError> {
        EventKey::decode(&self.foreign_id)
    }

    pub fn run_key(&self) -> Result<RunKey, KeyError> {
        self.key().map(|k| k.run_key())
    }
}

/// Payload of `RunCreated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCreatedPayload {
    pub args: Value,
}

/// Payload of `ActivityRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequestPayload {
    pub args: Value,
    /// Ordinal of this request among all requests of the run
    pub call: u32,
}

/// Payload of `ActivityResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivityResult {
    Completed {
        result: Value,
    },
    Failed {
        error: String,
        #[serde(default)]
        cancelled: bool,
    },
}

/// Payload of `SleepRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRequestPayload {
    pub duration_ms: u64,
    /// Ordinal of this request among all requests of the run
    pub call: u32,
}

/// Payload of `SleepDone`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepDonePayload {}

/// Payload of `Signal`.
///
/// A timeout is stored explicitly rather than inferred from absence, so a
/// replay after the wait expired never waits again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalPayload {
    Received { value: Value },
    TimedOut { index: u32 },
}

/// Payload of `RunCompleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub output: Value,
}

/// Why a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The workflow function returned an error
    Error,
    /// The workflow function panicked
    Panic,
    /// The recorded call sequence disagrees with the one replayed
    Determinism,
}

/// Payload of `RunFailed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailedPayload {
    pub reason: FailureReason,
    pub message: String,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

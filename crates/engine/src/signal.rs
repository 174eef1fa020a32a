// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal correlation
//!
//! Signals of one kind fill the run's wait slots in log order. A timeout
//! marker for slot `n` only counts if slot `n` is still open when the marker is
//! read; a signal that lands after a marker fills the next slot instead.

use chrono::{DateTime, Utc};
use replay_core::{payload, EventType, NewEvent, PayloadError, RunKey, SignalPayload};
use serde::Serialize;
use serde_json::Value;

/// A resolved wait slot
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Received { value: Value, at: DateTime<Utc> },
    TimedOut { at: DateTime<Utc> },
}

/// Resolved slots for one signal kind of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSlots {
    slots: Vec<Slot>,
}

impl SignalSlots {
    /// Feed the next signal event of this kind, in log order
    pub fn record(&mut self, signal: SignalPayload, at: DateTime<Utc>) {
        match signal {
            SignalPayload::Received { value } => self.slots.push(Slot::Received { value, at }),
            SignalPayload::TimedOut { index } => {
                if index as usize == self.slots.len() {
                    self.slots.push(Slot::TimedOut { at });
                } else {
                    tracing::debug!(index, filled = self.slots.len(), "ignoring late timeout marker");
                }
            }
        }
    }

    pub fn slot(&self, index: u32) -> Option<&Slot> {
        self.slots.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Event delivering `value` to `run`, unique per `(kind, external_id)`
pub(crate) fn received_event<T: Serialize + ?Sized>(
    run: &RunKey,
    kind: &str,
    value: &T,
    external_id: &str,
) -> Result<NewEvent, PayloadError> {
    let signal = SignalPayload::Received {
        value: payload::encode(value)?,
    };
    Ok(NewEvent::new(
        EventType::Signal,
        &run.signal_key(kind, external_id),
        payload::encode(&signal)?,
    ))
}

/// Marker closing wait slot `index` of `kind` without a signal
pub(crate) fn timeout_marker(
    run: &RunKey,
    kind: &str,
    index: u32,
) -> Result<NewEvent, PayloadError> {
    Ok(NewEvent::new(
        EventType::Signal,
        &run.call_key(kind, index),
        payload::encode(&SignalPayload::TimedOut { index })?,
    ))
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;

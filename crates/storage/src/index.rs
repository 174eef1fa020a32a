// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory index over the log, shared by the memory and file backends
//!
//! Holds the events in sequence order plus the lookup tables the log
//! interface needs: the uniqueness set, per-run positions and terminal runs.

use crate::log::{LogError, RunStatus};
use replay_core::{DedupClass, Event, EventType, NewEvent, RunKey};
use std::collections::{BTreeMap, HashMap};

/// Outcome of checking a new event against the index
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Can be appended; carries the decoded run key
    Admit(RunKey),
    /// An event with the same identity is already stored
    Duplicate,
    /// The run already has a terminal event
    RunEnded,
    /// A response whose request is not stored
    Unrequested,
}

#[derive(Debug, Default)]
struct RunEntry {
    positions: Vec<usize>,
    terminal: bool,
}

type UniqueKey = (String, DedupClass, String);

/// Index built by applying events in log order
#[derive(Debug, Default)]
pub(crate) struct LogIndex {
    events: Vec<Event>,
    unique: HashMap<UniqueKey, usize>,
    runs: BTreeMap<RunKey, RunEntry>,
}

impl LogIndex {
    /// Sequence number of the last event, 0 when empty
    pub(crate) fn head(&self) -> u64 {
        self.events.last().map(|e| e.seq).unwrap_or(0)
    }

    pub(crate) fn check(&self, event: &NewEvent) -> Result<Admission, LogError> {
        let run = event.key()?.run_key();
        let unique = (
            event.namespace.clone(),
            event.kind.dedup_class(),
            event.foreign_id.clone(),
        );
        if self.unique.contains_key(&unique) {
            return Ok(Admission::Duplicate);
        }
        if self.runs.get(&run).map(|r| r.terminal).unwrap_or(false) {
            return Ok(Admission::RunEnded);
        }
        if let Some(class) = event.kind.answers() {
            let request = (unique.0, class, unique.2);
            if !self.unique.contains_key(&request) {
                return Ok(Admission::Unrequested);
            }
        }
        Ok(Admission::Admit(run))
    }

    /// Apply an already-admitted event
    pub(crate) fn apply(&mut self, event: Event, run: RunKey) {
        let position = self.events.len();
        self.unique.insert(
            (
                event.namespace.clone(),
                event.kind.dedup_class(),
                event.foreign_id.clone(),
            ),
            position,
        );
        let entry = self.runs.entry(run).or_default();
        entry.positions.push(position);
        entry.terminal |= event.kind.is_terminal();
        self.events.push(event);
    }

    pub(crate) fn read_after(&self, namespace: &str, after: u64, limit: usize) -> Vec<Event> {
        let start = self.events.partition_point(|e| e.seq <= after);
        self.events[start..]
            .iter()
            .filter(|e| e.namespace == namespace)
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn all_events(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub(crate) fn load_run(&self, run: &RunKey) -> Vec<Event> {
        self.runs
            .get(run)
            .map(|r| r.positions.iter().map(|&p| self.events[p].clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn lookup(&self, namespace: &str, kind: EventType, foreign_id: &str) -> Option<Event> {
        let unique = (namespace.to_string(), kind.dedup_class(), foreign_id.to_string());
        self.unique
            .get(&unique)
            .map(|&p| &self.events[p])
            .filter(|e| e.kind == kind)
            .cloned()
    }

    pub(crate) fn runs(&self, namespace: &str) -> Vec<RunStatus> {
        self.runs
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(key, entry)| RunStatus {
                key: key.clone(),
                terminal: entry.terminal,
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;

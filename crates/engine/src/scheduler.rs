// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer-based wake-ups for runs waiting on a signal deadline

use chrono::{DateTime, Utc};
use replay_core::RunKey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// A scheduled wake-up
#[derive(Debug, Clone)]
pub struct ScheduledItem {
    pub run: RunKey,
    pub fire_at: DateTime<Utc>,
}

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.run == other.run
    }
}

impl Eq for ScheduledItem {}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest first
        Reverse((self.fire_at, &self.run)).cmp(&Reverse((other.fire_at, &other.run)))
    }
}

/// Stale entries tolerated before the queue is rebuilt
const COMPACT_SLACK: usize = 16;

/// Manages wake-ups; a run has at most one live wake-up
#[derive(Debug, Default)]
pub struct Scheduler {
    items: BinaryHeap<ScheduledItem>,
    live: HashMap<RunKey, DateTime<Utc>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `run`, replacing any earlier wake-up for it
    pub fn schedule(&mut self, run: RunKey, fire_at: DateTime<Utc>) {
        if self.live.get(&run) == Some(&fire_at) {
            return;
        }
        self.live.insert(run.clone(), fire_at);
        self.items.push(ScheduledItem { run, fire_at });
        self.compact();
    }

    /// Superseded and cancelled entries stay queued until popped; rebuild
    /// once they outnumber the live ones
    fn compact(&mut self) {
        if self.items.len() <= 2 * self.live.len() + COMPACT_SLACK {
            return;
        }
        self.items = self
            .live
            .iter()
            .map(|(run, fire_at)| ScheduledItem {
                run: run.clone(),
                fire_at: *fire_at,
            })
            .collect();
    }

    /// Cancel the wake-up for `run`, if any
    pub fn cancel(&mut self, run: &RunKey) {
        self.live.remove(run);
    }

    /// Runs whose wake-up is at or before `now`
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<RunKey> {
        let mut ready = Vec::new();

        while let Some(item) = self.items.peek() {
            if item.fire_at > now {
                break;
            }

            let Some(item) = self.items.pop() else {
                break;
            };

            // Skip superseded and cancelled entries
            if self.live.get(&item.run) != Some(&item.fire_at) {
                continue;
            }
            self.live.remove(&item.run);
            ready.push(item.run);
        }

        ready
    }

    /// Earliest live wake-up
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(item) = self.items.peek() {
            if self.live.get(&item.run) == Some(&item.fire_at) {
                return Some(item.fire_at);
            }
            self.items.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

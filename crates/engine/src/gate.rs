// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At most one attempt per run

use replay_core::RunKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tracks runs with an attempt in flight.
///
/// A trigger for a busy run marks it dirty instead of starting a second
/// attempt; the holder then runs one more attempt before leaving.
#[derive(Clone, Debug, Default)]
pub struct RunGate {
    busy: Arc<Mutex<HashMap<RunKey, bool>>>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `run`. `false` means another attempt holds it (now marked dirty).
    pub fn try_enter(&self, run: &RunKey) -> bool {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        match busy.get_mut(run) {
            Some(dirty) => {
                *dirty = true;
                false
            }
            None => {
                busy.insert(run.clone(), false);
                true
            }
        }
    }

    /// Release `run` unless it was triggered meanwhile. `true` means the
    /// caller still holds it and must attempt again.
    pub fn leave(&self, run: &RunKey) -> bool {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        match busy.get_mut(run) {
            Some(dirty) if *dirty => {
                *dirty = false;
                true
            }
            _ => {
                busy.remove(run);
                false
            }
        }
    }

    /// Release `run` unconditionally
    pub fn release(&self, run: &RunKey) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(run);
    }

    pub fn is_busy(&self, run: &RunKey) -> bool {
        let busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.contains_key(run)
    }
}

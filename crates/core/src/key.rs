// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity codec for runs and call sites
//!
//! Every event carries an opaque foreign id: the deterministic encoding of the
//! `(namespace, workflow, run, activity, index)` tuple (plus the external id for
//! signals). The log enforces uniqueness on it, which is what turns a repeated
//! request emission into a no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reserved activity name under which sleep timers are keyed
pub const SLEEP_ACTIVITY: &str = "replay.sleep";

/// Errors decoding a foreign id
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("malformed key: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("key field `{0}` is empty")]
    EmptyField(&'static str),
}

/// Identifies one run of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub namespace: String,
    pub workflow: String,
    pub run: String,
}

impl RunKey {
    pub fn new(
        namespace: impl Into<String>,
        workflow: impl Into<String>,
        run: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow: workflow.into(),
            run: run.into(),
        }
    }

    /// Key of the run-level events (`RunCreated`, terminal events)
    pub fn event_key(&self) -> EventKey {
        EventKey {
            namespace: self.namespace.clone(),
            workflow: self.workflow.clone(),
            run: self.run.clone(),
            activity: None,
            index: None,
            external_id: None,
        }
    }

    /// Key of the `index`th call to `activity` within this run
    pub fn call_key(&self, activity: impl Into<String>, index: u32) -> EventKey {
        EventKey {
            activity: Some(activity.into()),
            index: Some(index),
            ..self.event_key()
        }
    }

    /// Key of an externally sent signal
    pub fn signal_key(&self, kind: impl Into<String>, external_id: impl Into<String>) -> EventKey {
        EventKey {
            activity: Some(kind.into()),
            external_id: Some(external_id.into()),
            ..self.event_key()
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.workflow, self.run)
    }
}

/// Full identity of an event.
///
/// Field order is part of the encoding; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub namespace: String,
    pub workflow: String,
    pub run: String,
    /// Activity name, sleep marker or signal kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl EventKey {
    /// Encode into the opaque foreign id stored with the event
    pub fn encode(&self) -> String {
        // Only strings and integers: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a foreign id produced by [`EventKey::encode`]
    pub fn decode(foreign_id: &str) -> Result<Self, KeyError> {
        let key: EventKey = serde_json::from_str(foreign_id)?;
        if key.namespace.is_empty() {
            return Err(KeyError::EmptyField("namespace"));
        }
        if key.workflow.is_empty() {
            return Err(KeyError::EmptyField("workflow"));
        }
        if key.run.is_empty() {
            return Err(KeyError::EmptyField("run"));
        }
        if key.activity.as_deref() == Some("") {
            return Err(KeyError::EmptyField("activity"));
        }
        Ok(key)
    }

    pub fn run_key(&self) -> RunKey {
        RunKey {
            namespace: self.namespace.clone(),
            workflow: self.workflow.clone(),
            run: self.run.clone(),
        }
    }

    pub fn is_sleep(&self) -> bool {
        self.activity.as_deref() == Some(SLEEP_ACTIVITY)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.workflow, self.run)?;
        if let Some(activity) = &self.activity {
            write!(f, "/{}", activity)?;
        }
        if let Some(index) = self.index {
            write!(f, "#{}", index)?;
        }
        if let Some(external_id) = &self.external_id {
            write!(f, "@{}", external_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run context: the workflow's view of its own history during one attempt
//!
//! Every primitive call is numbered per call type (per activity name, per
//! sleep, per signal kind). A call whose result is recorded returns it; a call
//! that was requested but not yet answered suspends; a call never seen before
//! buffers exactly one new request and suspends. Activity and sleep requests
//! also carry a run-wide ordinal that is checked against the recorded
//! requests to detect a workflow that no longer replays its own history.

use crate::error::{ActivityFailure, EngineError, RunError};
use crate::signal::{self, SignalSlots, Slot};
use chrono::{DateTime, Utc};
use replay_core::clock::to_chrono;
use replay_core::{
    payload, ActivityRequestPayload, ActivityResult, Event, EventType, FailureReason, NewEvent,
    RunCreatedPayload, RunKey, SignalPayload, SleepRequestPayload, SLEEP_ACTIVITY,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Activity,
    Sleep,
}

/// A request as identified by the determinism check
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedRequest {
    kind: RequestKind,
    name: String,
    index: u32,
}

impl fmt::Display for RecordedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RequestKind::Activity => write!(f, "activity `{}` #{}", self.name, self.index),
            RequestKind::Sleep => write!(f, "sleep #{}", self.index),
        }
    }
}

/// A run's events indexed for replay
#[derive(Debug, Default)]
pub(crate) struct History {
    args: Value,
    created_at: DateTime<Utc>,
    /// Requests by run-wide call ordinal
    requests: BTreeMap<u32, RecordedRequest>,
    requested: HashSet<(String, u32)>,
    responses: HashMap<(String, u32), (ActivityResult, DateTime<Utc>)>,
    sleeps_done: HashMap<u32, DateTime<Utc>>,
    signals: HashMap<String, SignalSlots>,
}

impl History {
    /// Index `events` (one run, log order). `None` when the run was never created.
    pub(crate) fn build(events: &[Event]) -> Result<Option<Self>, EngineError> {
        let mut history = History::default();
        let mut created = false;

        for event in events {
            let key = event.key()?;
            let call_id = || {
                (
                    key.activity.clone().unwrap_or_default(),
                    key.index.unwrap_or_default(),
                )
            };
            match event.kind {
                EventType::RunCreated => {
                    let created_payload: RunCreatedPayload = payload::decode(event.payload.clone())?;
                    history.args = created_payload.args;
                    history.created_at = event.created_at;
                    created = true;
                }
                EventType::ActivityRequest => {
                    let request: ActivityRequestPayload = payload::decode(event.payload.clone())?;
                    let (name, index) = call_id();
                    history.record_request(request.call, RequestKind::Activity, name, index);
                }
                EventType::SleepRequest => {
                    let request: SleepRequestPayload = payload::decode(event.payload.clone())?;
                    let (_, index) = call_id();
                    history.record_request(
                        request.call,
                        RequestKind::Sleep,
                        SLEEP_ACTIVITY.to_string(),
                        index,
                    );
                }
                EventType::ActivityResponse => {
                    let result: ActivityResult = payload::decode(event.payload.clone())?;
                    history
                        .responses
                        .insert(call_id(), (result, event.created_at));
                }
                EventType::SleepDone => {
                    let (_, index) = call_id();
                    history.sleeps_done.insert(index, event.created_at);
                }
                EventType::Signal => {
                    let signal: SignalPayload = payload::decode(event.payload.clone())?;
                    let (kind, _) = call_id();
                    history
                        .signals
                        .entry(kind)
                        .or_default()
                        .record(signal, event.created_at);
                }
                EventType::RunCompleted | EventType::RunFailed => {}
            }
        }

        Ok(created.then_some(history))
    }

    fn record_request(&mut self, call: u32, kind: RequestKind, name: String, index: u32) {
        self.requested.insert((name.clone(), index));
        self.requests
            .entry(call)
            .or_insert(RecordedRequest { kind, name, index });
    }
}

/// Why an attempt stopped early
#[derive(Debug)]
enum Stop {
    Suspend {
        append: Option<NewEvent>,
        wake_at: Option<DateTime<Utc>>,
    },
    Violation(String),
    /// A call that can never be recorded
    Invalid(String),
}

/// What an attempt leaves behind
#[derive(Debug)]
pub(crate) enum Verdict {
    Suspend {
        append: Option<NewEvent>,
        wake_at: Option<DateTime<Utc>>,
    },
    Complete(Value),
    Fail {
        reason: FailureReason,
        message: String,
    },
}

/// Handed to the workflow body for one attempt
pub struct RunContext {
    run: RunKey,
    history: History,
    now: DateTime<Utc>,
    /// `created_at` of the latest event this attempt consumed
    watermark: DateTime<Utc>,
    activity_calls: HashMap<String, u32>,
    sleep_calls: u32,
    signal_calls: HashMap<String, u32>,
    calls: u32,
    stop: Option<Stop>,
}

impl RunContext {
    pub(crate) fn new(run: RunKey, history: History, now: DateTime<Utc>) -> Self {
        let watermark = history.created_at;
        Self {
            run,
            history,
            now,
            watermark,
            activity_calls: HashMap::new(),
            sleep_calls: 0,
            signal_calls: HashMap::new(),
            calls: 0,
            stop: None,
        }
    }

    /// The run this attempt belongs to
    pub fn run(&self) -> &RunKey {
        &self.run
    }

    pub(crate) fn args(&self) -> Value {
        self.history.args.clone()
    }

    /// Execute activity `name` with `args`, returning its recorded result.
    ///
    /// A failure recorded for the activity is returned as
    /// [`RunError::Activity`]; the workflow may handle it and carry on.
    pub fn execute_activity<A, R>(&mut self, name: &str, args: &A) -> Result<R, RunError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.ensure_running()?;
        self.ensure_named("activity", name)?;
        let index = next(self.activity_calls.entry(name.to_string()).or_default());
        let call = self.next_call(RequestKind::Activity, name, index)?;

        if let Some((result, at)) = self.history.responses.get(&(name.to_string(), index)) {
            let (result, at) = (result.clone(), *at);
            self.advance(at);
            return match result {
                ActivityResult::Completed { result } => Ok(payload::decode(result)?),
                ActivityResult::Failed { error, cancelled } => {
                    Err(RunError::Activity(ActivityFailure {
                        message: error,
                        cancelled,
                    }))
                }
            };
        }

        if self.history.requested.contains(&(name.to_string(), index)) {
            return Err(self.suspend(None, None));
        }

        let request = ActivityRequestPayload {
            args: payload::encode(args)?,
            call,
        };
        let event = NewEvent::new(
            EventType::ActivityRequest,
            &self.run.call_key(name, index),
            payload::encode(&request)?,
        );
        Err(self.suspend(Some(event), None))
    }

    /// Durable sleep; resumes once the sleep service records it done
    pub fn sleep(&mut self, duration: Duration) -> Result<(), RunError> {
        self.ensure_running()?;
        let index = next(&mut self.sleep_calls);
        let call = self.next_call(RequestKind::Sleep, SLEEP_ACTIVITY, index)?;

        if let Some(at) = self.history.sleeps_done.get(&index).copied() {
            self.advance(at);
            return Ok(());
        }

        if self
            .history
            .requested
            .contains(&(SLEEP_ACTIVITY.to_string(), index))
        {
            return Err(self.suspend(None, None));
        }

        let request = SleepRequestPayload {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            call,
        };
        let event = NewEvent::new(
            EventType::SleepRequest,
            &self.run.call_key(SLEEP_ACTIVITY, index),
            payload::encode(&request)?,
        );
        Err(self.suspend(Some(event), None))
    }

    /// Wait for the next signal of `kind`; `None` when `timeout` passes first.
    ///
    /// The timeout counts from the latest event this attempt consumed, so every
    /// attempt computes the same deadline.
    pub fn await_signal<T: DeserializeOwned>(
        &mut self,
        kind: &str,
        timeout: Duration,
    ) -> Result<Option<T>, RunError> {
        self.ensure_running()?;
        self.ensure_named("signal", kind)?;
        let index = next(self.signal_calls.entry(kind.to_string()).or_default());

        let slot = self
            .history
            .signals
            .get(kind)
            .and_then(|slots| slots.slot(index))
            .cloned();
        match slot {
            Some(Slot::Received { value, at }) => {
                self.advance(at);
                Ok(Some(payload::decode(value)?))
            }
            Some(Slot::TimedOut { at }) => {
                self.advance(at);
                Ok(None)
            }
            None => {
                let deadline = self
                    .watermark
                    .checked_add_signed(to_chrono(timeout))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if self.now < deadline {
                    return Err(self.suspend(None, Some(deadline)));
                }
                let marker = signal::timeout_marker(&self.run, kind, index)?;
                Err(self.suspend(Some(marker), None))
            }
        }
    }

    fn ensure_running(&self) -> Result<(), RunError> {
        match &self.stop {
            None => Ok(()),
            Some(Stop::Suspend { .. }) => Err(RunError::Suspended),
            Some(Stop::Violation(message)) => Err(RunError::Determinism(message.clone())),
            Some(Stop::Invalid(message)) => Err(RunError::Failed(message.clone())),
        }
    }

    /// Calls are keyed by name; an empty one has no key
    fn ensure_named(&mut self, call: &str, name: &str) -> Result<(), RunError> {
        if !name.is_empty() {
            return Ok(());
        }
        let message = format!("{call} name must not be empty");
        self.stop = Some(Stop::Invalid(message.clone()));
        Err(RunError::Failed(message))
    }

    /// Number the next request and check it against the recorded one
    fn next_call(&mut self, kind: RequestKind, name: &str, index: u32) -> Result<u32, RunError> {
        let call = next(&mut self.calls);
        let issued = RecordedRequest {
            kind,
            name: name.to_string(),
            index,
        };
        match self.history.requests.get(&call) {
            Some(recorded) if *recorded != issued => {
                let message = format!("call {call} issued {issued} but history recorded {recorded}");
                self.stop = Some(Stop::Violation(message.clone()));
                Err(RunError::Determinism(message))
            }
            _ => Ok(call),
        }
    }

    fn suspend(&mut self, append: Option<NewEvent>, wake_at: Option<DateTime<Utc>>) -> RunError {
        self.stop = Some(Stop::Suspend { append, wake_at });
        RunError::Suspended
    }

    fn advance(&mut self, at: DateTime<Utc>) {
        if at > self.watermark {
            self.watermark = at;
        }
    }

    /// Turn the body's result into the attempt's single outcome.
    ///
    /// Once a primitive suspended, the attempt is suspended whatever the body
    /// did afterwards, including panicking on the `Suspended` error.
    pub(crate) fn finish(self, result: std::thread::Result<Result<Value, RunError>>) -> Verdict {
        match (self.stop, result) {
            (Some(Stop::Violation(message)), _) => Verdict::Fail {
                reason: FailureReason::Determinism,
                message,
            },
            (Some(Stop::Invalid(message)), _) => Verdict::Fail {
                reason: FailureReason::Error,
                message,
            },
            (Some(Stop::Suspend { append, wake_at }), _) => Verdict::Suspend { append, wake_at },
            (None, Err(panic)) => Verdict::Fail {
                reason: FailureReason::Panic,
                message: panic_message(panic.as_ref()),
            },
            (None, Ok(Ok(output))) => {
                let mut unconsumed = self.history.requests.range(self.calls..);
                match unconsumed.next() {
                    Some((_, first)) => Verdict::Fail {
                        reason: FailureReason::Determinism,
                        message: format!(
                            "workflow returned after {} call(s) but history recorded {first} next",
                            self.calls
                        ),
                    },
                    None => Verdict::Complete(output),
                }
            }
            (None, Ok(Err(RunError::Suspended))) => Verdict::Suspend {
                append: None,
                wake_at: None,
            },
            (None, Ok(Err(RunError::Determinism(message)))) => Verdict::Fail {
                reason: FailureReason::Determinism,
                message,
            },
            (None, Ok(Err(e))) => Verdict::Fail {
                reason: FailureReason::Error,
                message: e.to_string(),
            },
        }
    }
}

/// Post-increment
fn next(counter: &mut u32) -> u32 {
    let current = *counter;
    *counter += 1;
    current
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "workflow panicked".to_string()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! replay-core: the data model of the durable replay engine
//!
//! This crate provides:
//! - The event log model (event types, payloads)
//! - The key/identity codec used for idempotent appends and correlation
//! - The payload codec and a testable clock

pub mod clock;
pub mod event;
pub mod key;
pub mod payload;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{
    ActivityRequestPayload, ActivityResult, DedupClass, Event, EventType, FailureReason,
    NewEvent, RunCompletedPayload, RunCreatedPayload, RunFailedPayload, SignalPayload,
    SleepDonePayload, SleepRequestPayload,
};
pub use key::{EventKey, KeyError, RunKey, SLEEP_ACTIVITY};
pub use payload::PayloadError;

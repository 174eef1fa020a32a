// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable replay engine
//!
//! Workflows are plain functions re-run from the start against their run's
//! recorded events on every attempt. Activities, sleeps and signal waits are
//! recorded in the event log, so a re-run observes the same results and the
//! run survives process restarts.

mod activity;
mod client;
mod config;
mod consumer;
mod context;
mod engine;
mod error;
mod gate;
mod registry;
mod replay;
mod scheduler;
mod signal;
mod sleep;

pub use activity::{ActivityContext, ActivityDispatcher, DispatchOutcome};
pub use client::Client;
pub use config::{EngineConfig, SleepConfig};
pub use context::RunContext;
pub use engine::Engine;
pub use error::{ActivityError, ActivityFailure, EngineError, RunError};
pub use gate::RunGate;
pub use registry::{BoxFuture, Registry, RegistryError};
pub use replay::{AttemptOutcome, Replayer, RunOutcome, SkipReason};
pub use scheduler::Scheduler;
pub use signal::{SignalSlots, Slot};
pub use sleep::{
    FileSleepStore, MemorySleepStore, ReadyCheck, SleepError, SleepService, SleepStore,
};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Durable storage for the replay engine: the event log and consumer cursors

mod cursor;
mod index;
mod log;
mod memory;
mod traced;
mod wal;

#[cfg(any(test, feature = "test-support"))]
mod flaky;

pub use cursor::{CursorError, CursorStore, FileCursorStore, MemoryCursorStore};
pub use log::{EventLog, LogError, RunStatus};
pub use memory::MemoryLog;
pub use traced::TracedEventLog;
pub use wal::FileLog;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use flaky::FlakyLog;

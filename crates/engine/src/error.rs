// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the replay engine

use replay_core::{KeyError, PayloadError};
use replay_storage::{CursorError, LogError};
use std::fmt;
use thiserror::Error;

/// Errors raised by the engine's own machinery (log, cursors, stores)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("log error: {0}")]
    Log(#[from] LogError),
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("sleep store error: {0}")]
    Sleep(#[from] crate::sleep::SleepError),
    #[error("invalid completion token: {0}")]
    InvalidToken(String),
    #[error("{0} attempt(s) failed")]
    Attempts(usize),
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A failed activity as seen by the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityFailure {
    pub message: String,
    /// The activity was stopped by cancellation rather than failing on its own
    pub cancelled: bool,
}

impl fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(f, "{} (cancelled)", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Errors seen by workflow code.
///
/// `Suspended` is not a failure: it unwinds the workflow body via `?` when the
/// attempt cannot make progress until more events arrive.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run suspended")]
    Suspended,
    #[error("activity failed: {0}")]
    Activity(ActivityFailure),
    #[error("determinism violation: {0}")]
    Determinism(String),
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("{0}")]
    Failed(String),
}

impl RunError {
    pub fn failed(message: impl Into<String>) -> Self {
        RunError::Failed(message.into())
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunError::Suspended)
    }
}

/// Errors returned by activity functions
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("{0}")]
    Failed(String),
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl ActivityError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActivityError::Failed(message.into())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable consumer cursors
//!
//! A cursor is the sequence number of the last event a named consumer has
//! fully processed. Consumers resume from it after a restart.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stores consumer positions by name
#[async_trait]
pub trait CursorStore: Send + Sync + 'static {
    /// Last processed sequence, 0 if the consumer never ran
    async fn get(&self, name: &str) -> Result<u64, CursorError>;
    async fn set(&self, name: &str, seq: u64) -> Result<(), CursorError>;
}

#[async_trait]
impl<S: CursorStore + ?Sized> CursorStore for Arc<S> {
    async fn get(&self, name: &str) -> Result<u64, CursorError> {
        (**self).get(name).await
    }

    async fn set(&self, name: &str, seq: u64) -> Result<(), CursorError> {
        (**self).set(name, seq).await
    }
}

/// Cursor store for tests and embedded use
#[derive(Clone, Default)]
pub struct MemoryCursorStore {
    cursors: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, name: &str) -> Result<u64, CursorError> {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cursors.get(name).copied().unwrap_or(0))
    }

    async fn set(&self, name: &str, seq: u64) -> Result<(), CursorError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.insert(name.to_string(), seq);
        Ok(())
    }
}

/// Cursor store persisted as a single JSON document.
///
/// Writes go to a temporary file that is renamed over the document, so a
/// crash leaves either the old or the new cursors, never a torn file.
pub struct FileCursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, u64>>,
}

impl FileCursorStore {
    pub fn open(path: &Path) -> Result<Self, CursorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cursors = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            cursors: Mutex::new(cursors),
        })
    }

    fn persist(&self, cursors: &BTreeMap<String, u64>) -> Result<(), CursorError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(cursors)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, name: &str) -> Result<u64, CursorError> {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cursors.get(name).copied().unwrap_or(0))
    }

    async fn set(&self, name: &str, seq: u64) -> Result<(), CursorError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.insert(name.to_string(), seq);
        self.persist(&cursors)
    }
}

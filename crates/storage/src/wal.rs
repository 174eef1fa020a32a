// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable event storage
//!
//! One JSON entry per line, each carrying a CRC32 of the serialized event.
//! Every append is fsync'd before it is acknowledged. On open the file is
//! replayed into the index; replay stops at the first truncated or corrupt
//! line and the file is cut back to the last valid entry.

use crate::index::{Admission, LogIndex};
use crate::log::{EventLog, LogError, RunStatus};
use async_trait::async_trait;
use replay_core::{Clock, Event, EventType, NewEvent, RunKey, SystemClock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Serialize, Deserialize)]
struct WalEntry {
    event: Event,
    checksum: u32,
}

impl WalEntry {
    fn new(event: Event) -> Result<Self, LogError> {
        let checksum = checksum(&event)?;
        Ok(Self { event, checksum })
    }

    fn verify(&self) -> bool {
        checksum(&self.event).map(|c| c == self.checksum).unwrap_or(false)
    }
}

fn checksum(event: &Event) -> Result<u32, LogError> {
    let json = serde_json::to_string(event)?;
    Ok(crc32fast::hash(json.as_bytes()))
}

struct WalState {
    index: LogIndex,
    file: File,
    /// Bytes of acknowledged entries
    len: u64,
    /// A failed write may have left bytes past `len`
    torn: bool,
}

impl WalState {
    /// Append one line and fsync it. A failed write is cut back off the file
    /// so the next entry starts on a line boundary.
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.torn {
            self.file.set_len(self.len)?;
            self.torn = false;
        }
        let written = writeln!(self.file, "{}", line).and_then(|()| self.file.sync_all());
        match written {
            Ok(()) => {
                self.len += line.len() as u64 + 1;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                if self.file.set_len(self.len).is_ok() {
                    self.torn = false;
                }
                Err(e)
            }
        }
    }
}

/// Event log persisted to a JSONL write-ahead log
pub struct FileLog<C = SystemClock> {
    path: PathBuf,
    state: Mutex<WalState>,
    head: watch::Sender<u64>,
    clock: C,
}

impl FileLog<SystemClock> {
    /// Open or create a log at the given path
    pub fn open(path: &Path) -> Result<Self, LogError> {
        Self::open_with_clock(path, SystemClock)
    }
}

impl<C: Clock> FileLog<C> {
    pub fn open_with_clock(path: &Path, clock: C) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (index, valid_len) = Self::replay(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "truncating corrupt tail of event log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let (head, _) = watch::channel(index.head());
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(WalState {
                index,
                file,
                len: valid_len,
                torn: false,
            }),
            head,
            clock,
        })
    }

    /// Rebuild the index from disk, returning it with the byte length of the
    /// valid prefix
    fn replay(path: &Path) -> Result<(LogIndex, u64), LogError> {
        let mut index = LogIndex::default();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((index, 0)),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut valid_len = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let read = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n as u64,
                Err(_) => break,
            };
            if !line.ends_with('\n') {
                break; // Truncated write
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                valid_len += read;
                continue;
            }
            let entry: WalEntry = match serde_json::from_str(trimmed) {
                Ok(entry) => entry,
                Err(_) => break,
            };
            if !entry.verify() || entry.event.seq <= index.head() {
                break;
            }
            let run = entry.event.run_key()?;
            index.apply(entry.event, run);
            valid_len += read;
        }

        Ok((index, valid_len))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<C: Clock> EventLog for FileLog<C> {
    async fn append(&self, event: NewEvent) -> Result<bool, LogError> {
        let seq = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let run = match state.index.check(&event)? {
                Admission::Admit(run) => run,
                Admission::Duplicate | Admission::RunEnded | Admission::Unrequested => {
                    return Ok(false)
                }
            };
            let seq = state.index.head() + 1;
            let event = event.into_event(seq, self.clock.now());
            let entry = WalEntry::new(event)?;
            let line = serde_json::to_string(&entry)?;

            // Critical: sync before the event becomes visible
            state.write_line(&line)?;

            state.index.apply(entry.event, run);
            seq
        };
        self.head.send_replace(seq);
        Ok(true)
    }

    async fn read_after(
        &self,
        namespace: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Event>, LogError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.read_after(namespace, after, limit))
    }

    async fn load_run(&self, run: &RunKey) -> Result<Vec<Event>, LogError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.load_run(run))
    }

    async fn lookup(
        &self,
        namespace: &str,
        kind: EventType,
        foreign_id: &str,
    ) -> Result<Option<Event>, LogError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.lookup(namespace, kind, foreign_id))
    }

    async fn runs(&self, namespace: &str) -> Result<Vec<RunStatus>, LogError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.runs(namespace))
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;

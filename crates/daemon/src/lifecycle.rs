// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use replay_core::SystemClock;
use replay_engine::{
    Client, Engine, EngineConfig, EngineError, FileSleepStore, RegistryError, RunOutcome,
    SleepConfig, SleepError, SleepService,
};
use replay_storage::{CursorError, FileCursorStore, FileLog, LogError, TracedEventLog};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::demo::{self, DemoBackends, DEMO_NAMESPACE};

/// Event log the daemon writes to
pub type DaemonLog = Arc<TracedEventLog<FileLog>>;

/// Engine with the daemon's concrete log and backends
pub type DaemonEngine = Engine<DaemonLog, DemoBackends<DaemonLog>>;

/// A run started at boot; starting it again is a no-op
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bootstrap {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub workflow: String,
    pub run: String,
    #[serde(default)]
    pub args: Value,
}

fn default_namespace() -> String {
    DEMO_NAMESPACE.to_string()
}

/// On-disk shape of the config file; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    state_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    namespaces: Option<Vec<String>>,
    engine: EngineConfig,
    sleep: SleepConfig,
    bootstrap: Vec<Bootstrap>,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the log, cursors, sleeps and lock file
    pub state_dir: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Namespaces the sleep service watches
    pub namespaces: Vec<String>,
    pub engine: EngineConfig,
    pub sleep: SleepConfig,
    pub bootstrap: Vec<Bootstrap>,
}

impl Config {
    /// Load from `path` (defaults when absent); `state_dir` overrides the file
    pub fn load(path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Self, LifecycleError> {
        let text = match path {
            Some(path) => std::fs::read_to_string(path)?,
            None => String::new(),
        };
        Self::from_toml(&text, state_dir)
    }

    pub fn from_toml(text: &str, state_dir: Option<PathBuf>) -> Result<Self, LifecycleError> {
        let file: ConfigFile = toml::from_str(text)?;
        let state_dir = match state_dir.or(file.state_dir) {
            Some(dir) => dir,
            None => default_state_dir()?,
        };
        Ok(Self {
            log_path: file
                .log_path
                .unwrap_or_else(|| state_dir.join("replayd.log")),
            state_dir,
            namespaces: file
                .namespaces
                .unwrap_or_else(|| vec![DEMO_NAMESPACE.to_string()]),
            engine: file.engine,
            sleep: file.sleep,
            bootstrap: file.bootstrap,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("replayd.pid")
    }

    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.wal")
    }

    pub fn cursors_path(&self) -> PathBuf {
        self.state_dir.join("cursors.json")
    }

    /// Pending sleeps of one namespace
    pub fn sleeps_path(&self, namespace: &str) -> PathBuf {
        self.state_dir.join(format!("sleeps-{namespace}.json"))
    }
}

/// Default state directory: `<data_local_dir>/replay`
fn default_state_dir() -> Result<PathBuf, LifecycleError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("replay"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub engine: DaemonEngine,
    /// Consumers, sleep services and the completion logger
    pub tasks: JoinSet<Result<(), EngineError>>,
    /// When daemon started
    pub start_time: Instant,
}

impl DaemonState {
    pub fn client(&self) -> Client<DaemonLog> {
        self.engine.client()
    }

    /// Cancel every task, wait for them and release the lock
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");
        self.engine.shutdown();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("task ended with error: {}", e),
                Err(e) => warn!("task did not finish cleanly: {}", e),
            }
        }

        let lock_path = self.config.lock_path();
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Daemon shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event log error: {0}")]
    Log(#[from] LogError),

    #[error("Cursor store error: {0}")]
    Cursor(#[from] CursorError),

    #[error("Sleep store error: {0}")]
    Sleep(#[from] SleepError),

    #[error("Registration error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // The lock belongs to the daemon already running
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST, before touching any store
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Open stores
    let log: DaemonLog = Arc::new(TracedEventLog::new(FileLog::open(&config.events_path())?));
    let cursors = Arc::new(FileCursorStore::open(&config.cursors_path())?);

    // 4. Build the engine and start the namespace consumers
    let backends = DemoBackends {
        client: Client::new(log.clone()),
    };
    let engine = Engine::new(
        log.clone(),
        demo::registry()?,
        backends,
        SystemClock,
        config.engine.clone(),
    );
    let mut tasks = engine.start(cursors.clone());

    // 5. Sleep services, one store per namespace
    for namespace in &config.namespaces {
        let store = FileSleepStore::open(&config.sleeps_path(namespace))?;
        let service = SleepService::new(log.clone(), store, SystemClock, config.sleep.clone());
        let namespace = namespace.clone();
        let cursors = cursors.clone();
        let engine_config = config.engine.clone();
        let shutdown = engine.shutdown_token();
        tasks.spawn(async move {
            service
                .run(&namespace, cursors, &engine_config, shutdown)
                .await
        });
    }

    // 6. Report runs as they end
    tasks.spawn(log_outcomes(engine.clone()));

    // 7. Bootstrap runs
    let client = engine.client();
    for run in &config.bootstrap {
        let created = client
            .run_workflow(&run.namespace, &run.workflow, &run.run, &run.args)
            .await?;
        info!(
            namespace = %run.namespace,
            workflow = %run.workflow,
            run = %run.run,
            created,
            "bootstrap run"
        );
    }

    info!("Daemon started in {}", config.state_dir.display());

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        engine,
        tasks,
        start_time: Instant::now(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    let lock_path = config.lock_path();
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

async fn log_outcomes(engine: DaemonEngine) -> Result<(), EngineError> {
    let mut outcomes = engine.subscribe();
    let shutdown = engine.shutdown_token();
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            received = outcomes.recv() => received,
        };
        match received {
            Ok(RunOutcome::Completed { run, output }) => {
                info!(run = %run, %output, "run completed");
            }
            Ok(RunOutcome::Failed {
                run,
                reason,
                message,
            }) => {
                error!(run = %run, ?reason, %message, "run failed");
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "completion log lagged"),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

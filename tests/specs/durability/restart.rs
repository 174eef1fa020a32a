// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart specs
//!
//! Verify a run survives an engine restart over a file log.

use crate::prelude::*;
use replay_storage::CursorStore;
use similar_asserts::assert_eq;
use tempfile::TempDir;

type Log = Arc<FileLog>;

fn two_ticks_then_wait(ctx: &mut RunContext, _: ()) -> Result<(usize, usize, i64), RunError> {
    let first = ctx.execute_activity("tick", &())?;
    let second = ctx.execute_activity("tick", &())?;
    let go = ctx
        .await_signal::<i64>("go", Duration::from_secs(3600))?
        .unwrap_or_default();
    Ok((first, second, go))
}

fn registry() -> Registry<Backends<Log>> {
    let mut registry = Registry::new();
    registry
        .register_workflow(NS, "resumable", two_ticks_then_wait)
        .unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    registry
}

fn open(dir: &TempDir, calls: Arc<AtomicUsize>) -> (World<Log>, Arc<FileCursorStore>) {
    let log = Arc::new(FileLog::open(&dir.path().join("events.wal")).unwrap());
    let cursors = Arc::new(FileCursorStore::open(&dir.path().join("cursors.json")).unwrap());
    let world = World::on(log, cursors.clone(), registry(), calls);
    (world, cursors)
}

#[tokio::test]
async fn restart_resumes_without_rerunning_activities() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let run = RunKey::new(NS, "resumable", "r1");

    let (world, _) = open(&dir, calls.clone());
    world.client().run_workflow(NS, "resumable", "r1", &()).await.unwrap();
    world.wait_for_count(EventType::ActivityResponse, 2).await;
    world.stop().await;

    let (mut world, _) = open(&dir, calls.clone());
    world
        .client()
        .signal_run(NS, "resumable", "r1", "go", &9, "go-1")
        .await
        .unwrap();
    let outcome = world.wait(&run).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run,
            output: json!([0, 1, 9]),
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    world.stop().await;
}

#[tokio::test]
async fn consumer_cursors_are_persisted() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let (world, cursors) = open(&dir, calls.clone());
    world.client().run_workflow(NS, "resumable", "r1", &()).await.unwrap();
    world.wait_for_count(EventType::ActivityResponse, 2).await;
    world.stop().await;
    drop(cursors);

    let reopened = FileCursorStore::open(&dir.path().join("cursors.json")).unwrap();
    assert!(reopened.get("ns.workflows").await.unwrap() > 0);
    assert!(reopened.get("ns.activities").await.unwrap() > 0);
}

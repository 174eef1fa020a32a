// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run failure specs
//!
//! Verify how workflow errors, panics, activity failures and
//! non-deterministic code end a run.

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn refuse<L>(_: ActivityContext, _: Arc<Backends<L>>, _: ()) -> Result<(), ActivityError> {
    Err(ActivityError::failed("card declined"))
}

/// Handles the failed activity and reports its message
fn recovering(ctx: &mut RunContext, _: ()) -> Result<String, RunError> {
    match ctx.execute_activity::<_, ()>("refuse", &()) {
        Ok(()) => Ok("charged".to_string()),
        Err(RunError::Activity(failure)) => Ok(format!("fallback: {}", failure.message)),
        Err(e) => Err(e),
    }
}

fn giving_up(ctx: &mut RunContext, _: ()) -> Result<(), RunError> {
    ctx.execute_activity::<_, ()>("refuse", &())
}

fn unnamed_call(ctx: &mut RunContext, _: ()) -> Result<usize, RunError> {
    ctx.execute_activity::<_, usize>("", &())
}

fn one_tick(ctx: &mut RunContext, _: ()) -> Result<usize, RunError> {
    ctx.execute_activity::<_, usize>("tick", &())
}

fn panicking(_: &mut RunContext, _: ()) -> Result<(), RunError> {
    panic!("index out of range")
}

fn ticks_then_waits(ctx: &mut RunContext, _: ()) -> Result<(), RunError> {
    ctx.execute_activity::<_, usize>("tick", &())?;
    ctx.await_signal::<i64>("go", Duration::from_secs(3600))?;
    Ok(())
}

/// Same name as [`ticks_then_waits`], different first call
fn sleeps_then_waits(ctx: &mut RunContext, _: ()) -> Result<(), RunError> {
    ctx.sleep(Duration::from_secs(1))?;
    ctx.await_signal::<i64>("go", Duration::from_secs(3600))?;
    Ok(())
}

fn registry() -> Registry<Backends<Arc<MemoryLog>>> {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "recovering", recovering).unwrap();
    registry.register_workflow(NS, "giving_up", giving_up).unwrap();
    registry.register_workflow(NS, "panicking", panicking).unwrap();
    registry.register_workflow(NS, "unnamed_call", unnamed_call).unwrap();
    registry.register_workflow(NS, "one_tick", one_tick).unwrap();
    registry.register_workflow(NS, "changing", ticks_then_waits).unwrap();
    registry.register_activity(NS, "refuse", refuse).unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    registry
}

#[tokio::test]
async fn activity_failure_is_visible_to_the_workflow() {
    let mut world = World::start(registry());

    let outcome = world.run("recovering", "r1", ()).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "recovering", "r1"),
            output: json!("fallback: card declined"),
        }
    );
    world.stop().await;
}

#[tokio::test]
async fn unhandled_activity_failure_fails_the_run() {
    let mut world = World::start(registry());

    let outcome = world.run("giving_up", "r1", ()).await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            reason: FailureReason::Error,
            ..
        }
    ));
    world.stop().await;
}

#[tokio::test]
async fn workflow_panic_records_run_failed() {
    let mut world = World::start(registry());

    let outcome = world.run("panicking", "r1", ()).await;

    match outcome {
        RunOutcome::Failed {
            reason, message, ..
        } => {
            assert_eq!(reason, FailureReason::Panic);
            assert!(message.contains("index out of range"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(world.count(EventType::RunFailed).await, 1);
    world.stop().await;
}

#[tokio::test]
async fn changed_workflow_code_fails_with_determinism_violation() {
    let log = Arc::new(MemoryLog::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let run = RunKey::new(NS, "changing", "r1");

    let world = World::on(log.clone(), MemoryCursorStore::new(), registry(), calls.clone());
    world.client().run_workflow(NS, "changing", "r1", &()).await.unwrap();
    world.wait_for_count(EventType::ActivityResponse, 1).await;
    world.stop().await;

    let mut changed = Registry::new();
    changed.register_workflow(NS, "changing", sleeps_then_waits).unwrap();
    let mut world = World::on(log, MemoryCursorStore::new(), changed, calls);
    let outcome = world.wait(&run).await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            reason: FailureReason::Determinism,
            ..
        }
    ));
    world.stop().await;
}

#[tokio::test]
async fn unnamed_call_fails_the_run_without_stalling_others() {
    let world = World::start(registry());
    let client = world.client();

    client.run_workflow(NS, "unnamed_call", "bad", &()).await.unwrap();
    client.run_workflow(NS, "one_tick", "good", &()).await.unwrap();
    world.wait_for_count(EventType::RunFailed, 1).await;
    world.wait_for_count(EventType::RunCompleted, 1).await;
    let bad = client.outcome(&RunKey::new(NS, "unnamed_call", "bad")).await.unwrap();
    let good = client.outcome(&RunKey::new(NS, "one_tick", "good")).await.unwrap();

    assert!(matches!(
        bad,
        Some(RunOutcome::Failed {
            reason: FailureReason::Error,
            ..
        })
    ));
    assert_eq!(
        good,
        Some(RunOutcome::Completed {
            run: RunKey::new(NS, "one_tick", "good"),
            output: json!(0),
        })
    );
    assert_eq!(world.count(EventType::ActivityRequest).await, 1);
    world.stop().await;
}

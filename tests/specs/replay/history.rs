// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay history specs
//!
//! Verify that re-run workflows observe their recorded results.

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn enrich<L>(_: ActivityContext, _: Arc<Backends<L>>, name: String) -> Result<String, ActivityError> {
    Ok(format!("[{name}]"))
}

fn greeting(ctx: &mut RunContext, mut name: String) -> Result<String, RunError> {
    for _ in 0..5 {
        name = ctx.execute_activity("enrich", &name)?;
    }
    Ok(name)
}

/// Interleaves two activities; each keeps its own call numbering
fn interleaved(ctx: &mut RunContext, _: ()) -> Result<Vec<usize>, RunError> {
    let mut seen = Vec::new();
    for i in 0..3 {
        seen.push(ctx.execute_activity::<_, usize>("tick", &())?);
        let echoed: String = ctx.execute_activity("enrich", &i.to_string())?;
        assert_eq!(echoed, format!("[{i}]"));
    }
    Ok(seen)
}

fn registry() -> Registry<Backends<Arc<MemoryLog>>> {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "greeting", greeting).unwrap();
    registry.register_workflow(NS, "interleaved", interleaved).unwrap();
    registry.register_activity(NS, "enrich", enrich).unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    registry
}

#[tokio::test]
async fn nth_call_receives_nth_recorded_value() {
    let mut world = World::start(registry());

    let outcome = world.run("interleaved", "r1", ()).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "interleaved", "r1"),
            output: json!([0, 1, 2]),
        }
    );
    world.stop().await;
}

#[tokio::test]
async fn completed_activities_are_not_invoked_again() {
    let mut world = World::start(registry());

    world.run("interleaved", "r1", ()).await;

    // Every attempt replays the earlier ticks; each ran once
    assert_eq!(world.invocations(), 3);
    world.stop().await;
}

#[tokio::test]
async fn five_activity_loop_records_five_pairs() {
    let mut world = World::start(registry());

    let outcome = world.run("greeting", "r1", "World").await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "greeting", "r1"),
            output: json!("[[[[[World]]]]]"),
        }
    );
    let kinds: Vec<EventType> = world.events().await.into_iter().map(|e| e.kind).collect();
    let mut expected = vec![EventType::RunCreated];
    for _ in 0..5 {
        expected.push(EventType::ActivityRequest);
        expected.push(EventType::ActivityResponse);
    }
    expected.push(EventType::RunCompleted);
    assert_eq!(kinds, expected);
    world.stop().await;
}

#[tokio::test]
async fn ended_run_is_not_replayed() {
    let mut world = World::start(registry());
    world.run("greeting", "r1", "World").await;
    let before = world.events().await.len();

    let outcome = world
        .engine
        .replay(&RunKey::new(NS, "greeting", "r1"))
        .await
        .unwrap();

    assert_eq!(outcome, AttemptOutcome::Skipped(SkipReason::Ended));
    assert_eq!(world.events().await.len(), before);
    world.stop().await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable sleep specs
//!
//! Verify sleeps are requested and completed through the sleep service.

use crate::prelude::*;
use similar_asserts::assert_eq;

const YEAR: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn sleepy(ctx: &mut RunContext, _: ()) -> Result<usize, RunError> {
    for _ in 0..10 {
        ctx.sleep(YEAR)?;
    }
    ctx.execute_activity("tick", &())
}

fn registry() -> Registry<Backends<Arc<MemoryLog>>> {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "sleepy", sleepy).unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    registry
}

#[tokio::test]
async fn ten_sleeps_complete_before_the_run() {
    let mut world = World::start(registry()).with_instant_sleeps();

    let outcome = world.run("sleepy", "r1", ()).await;

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    let kinds: Vec<EventType> = world
        .events()
        .await
        .into_iter()
        .map(|e| e.kind)
        .filter(|kind| matches!(kind, EventType::SleepRequest | EventType::SleepDone))
        .collect();
    let expected: Vec<EventType> = (0..10)
        .flat_map(|_| [EventType::SleepRequest, EventType::SleepDone])
        .collect();
    assert_eq!(kinds, expected);
    world.stop().await;
}

#[tokio::test]
async fn sleeping_run_waits_without_the_service() {
    let world = World::start(registry());
    let run = RunKey::new(NS, "sleepy", "r1");

    world.client().run_workflow(NS, "sleepy", "r1", &()).await.unwrap();
    world.wait_for_count(EventType::SleepRequest, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(world.count(EventType::SleepRequest).await, 1);
    assert_eq!(world.client().outcome(&run).await.unwrap(), None);
    world.stop().await;
}

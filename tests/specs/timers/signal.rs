// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal wait specs
//!
//! Verify signal delivery order and timeouts.

use crate::prelude::*;
use replay_core::{payload, SignalPayload};
use similar_asserts::assert_eq;

async fn maybe_signal<L: EventLog + Clone>(
    ctx: ActivityContext,
    b: Arc<Backends<L>>,
    round: i64,
) -> Result<(), ActivityError> {
    if round > 3 {
        return Ok(());
    }
    let run = ctx.key().run_key();
    let value = round + 100;
    b.client
        .signal_run(&run.namespace, &run.workflow, &run.run, "sig", &value, &value.to_string())
        .await?;
    Ok(())
}

fn summing(ctx: &mut RunContext, rounds: i64) -> Result<i64, RunError> {
    let mut sum = 0;
    for round in 0..rounds {
        ctx.execute_activity::<_, ()>("maybe_signal", &round)?;
        if let Some(value) = ctx.await_signal::<i64>("sig", Duration::from_millis(100))? {
            sum += value;
        }
    }
    Ok(sum)
}

/// Times out once, then keeps going with a recorded activity
fn timeout_then_tick(ctx: &mut RunContext, _: ()) -> Result<(Option<i64>, usize), RunError> {
    let signal = ctx.await_signal::<i64>("sig", Duration::from_millis(50))?;
    let ticked = ctx.execute_activity::<_, usize>("tick", &())?;
    Ok((signal, ticked))
}

fn registry() -> Registry<Backends<Arc<MemoryLog>>> {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "summing", summing).unwrap();
    registry
        .register_workflow(NS, "timeout_then_tick", timeout_then_tick)
        .unwrap();
    registry.register_activity(NS, "maybe_signal", maybe_signal).unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    registry
}

#[tokio::test]
async fn signals_sent_by_activities_are_summed() {
    let mut world = World::start(registry());

    let outcome = world.run("summing", "r1", 6).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "summing", "r1"),
            output: json!(406),
        }
    );
    world.stop().await;
}

#[tokio::test]
async fn signal_wait_times_out_exactly_once() {
    let mut world = World::start(registry());

    let outcome = world.run("timeout_then_tick", "r1", ()).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "timeout_then_tick", "r1"),
            output: json!([null, 0]),
        }
    );
    let markers: Vec<SignalPayload> = world
        .events()
        .await
        .into_iter()
        .filter(|e| e.kind == EventType::Signal)
        .map(|e| payload::decode(e.payload).unwrap())
        .collect();
    assert_eq!(markers, vec![SignalPayload::TimedOut { index: 0 }]);
    world.stop().await;
}

#[tokio::test]
async fn signal_after_run_end_is_refused() {
    let mut world = World::start(registry());
    let run = RunKey::new(NS, "timeout_then_tick", "r1");

    world.run("timeout_then_tick", "r1", ()).await;
    let late = world
        .client()
        .signal_run(NS, "timeout_then_tick", "r1", "sig", &5, "late")
        .await
        .unwrap();

    assert!(!late);
    assert!(matches!(
        world.client().outcome(&run).await.unwrap(),
        Some(RunOutcome::Completed { .. })
    ));
    world.stop().await;
}

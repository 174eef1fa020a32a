// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log idempotence specs
//!
//! Verify that duplicate appends and re-sent signals are stored once.

use crate::prelude::*;
use replay_core::{payload, ActivityRequestPayload, ActivityResult};
use similar_asserts::assert_eq;

fn wait_once(ctx: &mut RunContext, _: ()) -> Result<Vec<i64>, RunError> {
    let mut seen = Vec::new();
    while let Some(value) = ctx.await_signal::<i64>("ping", Duration::from_millis(300))? {
        seen.push(value);
    }
    Ok(seen)
}

#[tokio::test]
async fn duplicate_request_is_stored_once() {
    let log = MemoryLog::new();
    let key = RunKey::new(NS, "greeting", "r1").call_key("enrich", 0);
    let request = || {
        NewEvent::new(
            EventType::ActivityRequest,
            &key,
            payload::encode(&ActivityRequestPayload {
                args: json!("World"),
                call: 0,
            })
            .unwrap(),
        )
    };

    assert!(log.append(request()).await.unwrap());
    assert!(!log.append(request()).await.unwrap());

    let stored = log.read_after(NS, 0, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
}

fn tick_once(ctx: &mut RunContext, _: ()) -> Result<usize, RunError> {
    ctx.execute_activity::<_, usize>("tick", &())
}

#[tokio::test]
async fn early_completion_does_not_preempt_the_activity() {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "ticker", tick_once).unwrap();
    registry.register_activity(NS, "tick", tick).unwrap();
    let mut world = World::start(registry);
    let client = world.client();

    let forged = ActivityResult::Completed { result: json!(42) };
    let applied = client
        .complete_activity(NS, "ticker", "r1", "tick", 0, forged)
        .await
        .unwrap();
    assert!(!applied);

    let outcome = world.run("ticker", "r1", ()).await;
    let kinds: Vec<EventType> = world.events().await.iter().map(|e| e.kind).collect();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "ticker", "r1"),
            output: json!(0),
        }
    );
    assert_eq!(
        kinds,
        vec![
            EventType::RunCreated,
            EventType::ActivityRequest,
            EventType::ActivityResponse,
            EventType::RunCompleted,
        ]
    );
    assert_eq!(world.invocations(), 1);
    world.stop().await;
}

#[tokio::test]
async fn run_is_created_once() {
    let client = Client::new(Arc::new(MemoryLog::new()));

    assert!(client.run_workflow(NS, "greeting", "r1", "World").await.unwrap());
    assert!(!client.run_workflow(NS, "greeting", "r1", "Moon").await.unwrap());
}

#[tokio::test]
async fn resent_signal_is_delivered_once() {
    let mut registry = Registry::new();
    registry.register_workflow(NS, "waiter", wait_once).unwrap();
    let mut world = World::start(registry);
    let client = world.client();

    client.run_workflow(NS, "waiter", "r1", &()).await.unwrap();
    let first = client
        .signal_run(NS, "waiter", "r1", "ping", &7, "ext-1")
        .await
        .unwrap();
    let second = client
        .signal_run(NS, "waiter", "r1", "ping", &7, "ext-1")
        .await
        .unwrap();
    let outcome = world.wait(&RunKey::new(NS, "waiter", "r1")).await;

    assert!(first);
    assert!(!second);
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            run: RunKey::new(NS, "waiter", "r1"),
            output: json!([7]),
        }
    );
    world.stop().await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use replay_core::FakeClock;
use serde_json::json;
use std::time::Duration;

fn run() -> RunKey {
    RunKey::new("ns", "wf", "r1")
}

fn request(index: u32) -> NewEvent {
    NewEvent::new(
        EventType::ActivityRequest,
        &run().call_key("Enrich", index),
        json!({"args": "World", "call": index}),
    )
}

#[tokio::test]
async fn duplicate_append_reports_not_applied() {
    let log = MemoryLog::new();
    assert!(log.append(request(0)).await.unwrap());
    assert!(!log.append(request(0)).await.unwrap());
    assert_eq!(log.events().len(), 1);
}

#[tokio::test]
async fn sequence_numbers_are_contiguous() {
    let log = MemoryLog::new();
    for i in 0..3 {
        log.append(request(i)).await.unwrap();
    }
    let seqs: Vec<u64> = log.events().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[tokio::test]
async fn timestamps_come_from_the_clock() {
    let clock = FakeClock::new();
    let log = MemoryLog::with_clock(clock.clone());
    log.append(request(0)).await.unwrap();
    clock.advance(Duration::from_secs(90));
    log.append(request(1)).await.unwrap();

    let events = log.load_run(&run()).await.unwrap();
    assert_eq!((events[1].created_at - events[0].created_at).num_seconds(), 90);
}

#[tokio::test]
async fn subscribers_see_the_new_head() {
    let log = MemoryLog::new();
    let mut head = log.subscribe();
    assert_eq!(*head.borrow(), 0);

    log.append(request(0)).await.unwrap();
    head.changed().await.unwrap();
    assert_eq!(*head.borrow_and_update(), 1);
}

#[tokio::test]
async fn duplicate_append_does_not_notify() {
    let log = MemoryLog::new();
    log.append(request(0)).await.unwrap();
    let head = log.subscribe();
    log.append(request(0)).await.unwrap();
    assert!(!head.has_changed().unwrap());
}

#[tokio::test]
async fn malformed_foreign_id_is_an_error() {
    let log = MemoryLog::new();
    let event = NewEvent {
        namespace: "ns".to_string(),
        kind: EventType::Signal,
        foreign_id: "not-a-key".to_string(),
        payload: json!(null),
    };
    assert!(matches!(log.append(event).await, Err(LogError::Key(_))));
}

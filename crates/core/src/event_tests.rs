// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn terminal_types_share_a_dedup_class() {
    assert_eq!(
        EventType::RunCompleted.dedup_class(),
        EventType::RunFailed.dedup_class()
    );
    assert_ne!(
        EventType::ActivityRequest.dedup_class(),
        EventType::ActivityResponse.dedup_class()
    );
}

#[parameterized(
    created = { EventType::RunCreated, true },
    request = { EventType::ActivityRequest, false },
    response = { EventType::ActivityResponse, true },
    signal = { EventType::Signal, true },
    sleep_request = { EventType::SleepRequest, false },
    sleep_done = { EventType::SleepDone, true },
    completed = { EventType::RunCompleted, false },
    failed = { EventType::RunFailed, false },
)]
fn replay_triggers(kind: EventType, triggers: bool) {
    assert_eq!(kind.triggers_replay(), triggers);
}

#[parameterized(
    activity_response = { EventType::ActivityResponse, Some(DedupClass::ActivityRequest) },
    sleep_done = { EventType::SleepDone, Some(DedupClass::SleepRequest) },
    request = { EventType::ActivityRequest, None },
    signal = { EventType::Signal, None },
    created = { EventType::RunCreated, None },
)]
fn responses_answer_their_request(kind: EventType, answers: Option<DedupClass>) {
    assert_eq!(kind.answers(), answers);
}

#[test]
fn new_event_carries_encoded_key() {
    let key = RunKey::new("ns", "wf", "r").call_key("Act", 0);
    let event = NewEvent::new(EventType::ActivityRequest, &key, json!({}));
    assert_eq!(event.namespace, "ns");
    assert_eq!(event.key().unwrap(), key);

    let stored = event.into_event(7, Utc::now());
    assert_eq!(stored.seq, 7);
    assert_eq!(stored.run_key().unwrap(), RunKey::new("ns", "wf", "r"));
}

#[test]
fn activity_result_wire_format() {
    let ok = ActivityResult::Completed {
        result: json!("[World]"),
    };
    assert_eq!(
        serde_json::to_value(&ok).unwrap(),
        json!({"status": "completed", "result": "[World]"})
    );

    let failed: ActivityResult =
        serde_json::from_value(json!({"status": "failed", "error": "boom"})).unwrap();
    assert_eq!(
        failed,
        ActivityResult::Failed {
            error: "boom".to_string(),
            cancelled: false
        }
    );
}

#[test]
fn signal_payload_distinguishes_timeout() {
    let timed_out = serde_json::to_value(SignalPayload::TimedOut { index: 2 }).unwrap();
    assert_eq!(timed_out, json!({"outcome": "timed_out", "index": 2}));

    let received: SignalPayload =
        serde_json::from_value(json!({"outcome": "received", "value": 104})).unwrap();
    assert_eq!(received, SignalPayload::Received { value: json!(104) });
}

#[test]
fn event_serialization_roundtrip() {
    let event = NewEvent::new(
        EventType::RunFailed,
        &RunKey::new("ns", "wf", "r").event_key(),
        serde_json::to_value(RunFailedPayload {
            reason: FailureReason::Determinism,
            message: "mismatch".to_string(),
        })
        .unwrap(),
    )
    .into_event(1, Utc::now());

    let line = serde_json::to_string(&event).unwrap();
    let parsed: Event = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed, event);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::model::Severity;

fn event(kind: EventKind, session_id: &str, timestamp: u64) -> SessionEvent {
    let mut e = SessionEvent::new(kind, Severity::Info, session_id, "test");
    e.timestamp = timestamp;
    e
}

fn recorder() -> (EventHandler, Arc<Mutex<Vec<Vec<SessionEvent>>>>) {
    let batches: Arc<Mutex<Vec<Vec<SessionEvent>>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&batches);
    let handler: EventHandler = Arc::new(move |events| {
        captured.lock().unwrap_or_else(|e| e.into_inner()).push(events);
    });
    (handler, batches)
}

#[tokio::test]
async fn debounced_batch_arrives_as_one_delivery() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(40), max_batch_size: 5 });
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus.publish(event(EventKind::Ready, "s1", 10)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus.publish(event(EventKind::Ready, "s1", 20)).await;

    tokio::time::sleep(Duration::from_millis(80)).await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].len(), 3);
}

#[tokio::test]
async fn batch_flushes_immediately_at_max_size() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_secs(5), max_batch_size: 2 });
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    bus.publish(event(EventKind::Ready, "s1", 1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].len(), 2);
}

#[tokio::test]
async fn delivered_batch_is_sorted_by_priority_then_timestamp() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(30), max_batch_size: 20 });
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 1)).await;
    bus.publish(event(EventKind::TaskComplete, "s1", 2)).await;
    bus.publish(event(EventKind::Error, "s1", 3)).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 1);
    let kinds: Vec<EventKind> = captured[0].iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Error, EventKind::TaskComplete, EventKind::Ready]);
}

#[tokio::test]
async fn permission_request_bypasses_batching() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(200), max_batch_size: 20 });
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus.publish(SessionEvent::permission_request("s1", "req-1", "Bash", serde_json::json!({}))).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    {
        let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].len(), 1);
        assert_eq!(captured[0][0].kind, EventKind::PermissionRequest);
    }

    tokio::time::sleep(Duration::from_millis(250)).await;
    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[1][0].kind, EventKind::Ready);
}

#[tokio::test]
async fn subscriber_panic_does_not_break_other_subscribers() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(20), max_batch_size: 20 });
    let panicking: EventHandler = Arc::new(|_events| panic!("boom"));
    bus.subscribe("s1", panicking);
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 1);
}

#[tokio::test]
async fn remove_session_flushes_pending_even_without_subscribers() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_secs(5), max_batch_size: 20 });
    let (handler, batches) = recorder();
    bus.subscribe("s1", handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    bus.remove_session("s1").await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].len(), 1);
}

#[tokio::test]
async fn subscribe_all_receives_every_sessions_events() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(20), max_batch_size: 20 });
    let (handler, batches) = recorder();
    bus.subscribe_all(handler);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    bus.publish(event(EventKind::Ready, "s2", 0)).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let captured = batches.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.len(), 2);
}

#[tokio::test]
async fn unsubscribe_stops_future_deliveries() {
    let bus = EventBus::new(EventBusConfig { debounce: Duration::from_millis(20), max_batch_size: 20 });
    let (handler, batches) = recorder();
    let token = bus.subscribe("s1", handler);
    bus.unsubscribe("s1", token);

    bus.publish(event(EventKind::Ready, "s1", 0)).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(batches.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
}

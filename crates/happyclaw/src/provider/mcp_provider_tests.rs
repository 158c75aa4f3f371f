// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use super::*;
use crate::model::SessionEvent;

const SCRIPT: &str = r#"
printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"text":"hi from mcp"}}\n'
while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*) printf '{"jsonrpc":"2.0","id":1,"result":{}}\n' ;;
    *'"method":"tools/call"'*) printf '{"jsonrpc":"2.0","id":2,"result":{"content":"ack"}}\n' ;;
  esac
done
"#;

fn builder() -> CommandBuilder {
    Arc::new(|_id: &str, _opts: &SpawnOptions| vec!["sh".to_string(), "-c".to_string(), SCRIPT.to_string()])
}

fn opts() -> SpawnOptions {
    SpawnOptions { cwd: "/tmp".into(), mode: Mode::Remote, owner_id: "alice".into(), resume_session_id: None }
}

#[tokio::test]
async fn spawn_performs_handshake_and_routes_spontaneous_notification() {
    let provider = McpProvider::new(builder()).with_request_timeout(Duration::from_secs(5));

    let messages: Arc<StdMutex<Vec<SessionMessage>>> = Arc::new(StdMutex::new(Vec::new()));
    let captured = Arc::clone(&messages);

    let session = provider.spawn("m1", &opts()).await.expect("spawn");
    session.on_message(Arc::new(move |m| captured.lock().unwrap_or_else(|e| e.into_inner()).push(m)));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let page = session.read(0, 10).expect("read");
    assert!(page.messages.iter().any(|m| m.content == "hi from mcp"));
}

#[tokio::test]
async fn send_performs_tools_call_and_buffers_reply() {
    let provider = McpProvider::new(builder()).with_request_timeout(Duration::from_secs(5));
    let session = provider.spawn("m2", &opts()).await.expect("spawn");

    session.send("hello there").await.expect("send");
    let page = session.read(0, 10).expect("read");
    assert!(page.messages.iter().any(|m| m.content == "ack"));
}

#[tokio::test]
async fn permission_request_notification_becomes_event_with_child_supplied_id() {
    let provider = McpProvider::new(builder()).with_request_timeout(Duration::from_secs(5));
    let session = provider.spawn("m3", &opts()).await.expect("spawn");

    let events: Arc<StdMutex<Vec<SessionEvent>>> = Arc::new(StdMutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    session.on_event(Arc::new(move |e| captured.lock().unwrap_or_else(|e| e.into_inner()).push(e)));

    // Simulate the child raising a permission prompt by feeding the frame
    // through the same notification path a real child would use; since the
    // fixture script cannot be driven interactively, exercise the router
    // function directly against a session carrying the same shared state
    // shape as `spawn` produces.
    let shared = Shared {
        id: "m3".into(),
        cwd: "/tmp".into(),
        mode: Mode::Remote,
        buffer: MessageBuffer::new(),
        stopped: AtomicBool::new(false),
        event_handler: ListenerSlot::new(),
        message_handler: ListenerSlot::new(),
    };
    let captured2 = Arc::clone(&events);
    shared.event_handler.set(Arc::new(move |e| captured2.lock().unwrap_or_else(|e| e.into_inner()).push(e)));
    route_notification(
        &shared,
        serde_json::json!({
            "method": "notifications/permission_request",
            "params": {"requestId": "req-9", "toolName": "bash", "input": {"cmd": "ls"}}
        }),
    );

    assert_eq!(events.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);
    let ev = events.lock().unwrap_or_else(|e| e.into_inner())[0].clone();
    assert_eq!(ev.kind, EventKind::PermissionRequest);
    assert_eq!(ev.permission.expect("detail").request_id, "req-9");

    let _ = session; // keep the live session alive for the duration of the test
}

#[tokio::test]
async fn local_mode_rejects_send_read_and_respond() {
    let provider = McpProvider::new(builder()).with_request_timeout(Duration::from_secs(5));
    let local_opts = SpawnOptions { mode: Mode::Local, ..opts() };
    let session = provider.spawn("m4", &local_opts).await.expect("spawn");

    assert!(matches!(session.send("hi").await, Err(Error::NotSupported(_))));
    assert!(matches!(session.read(0, 10), Err(Error::NotSupported(_))));
    assert!(matches!(session.respond_to_permission("x", PermissionOutcome::Allow).await, Err(Error::NotSupported(_))));
}

#[tokio::test]
async fn stop_terminates_the_child_process() {
    let provider = McpProvider::new(builder()).with_request_timeout(Duration::from_secs(5));
    let session = provider.spawn("m5", &opts()).await.expect("spawn");
    let pid = session.pid().expect("pid");

    session.stop(false).await.expect("stop");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!crate::health::is_process_alive(pid));
}

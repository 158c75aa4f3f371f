// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;

use super::*;

fn spawn_sh(script: &str) -> Child {
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap_or_else(|e| panic!("spawn sh: {e}"))
}

#[tokio::test]
async fn request_resolves_on_matching_response() {
    let child = spawn_sh("while IFS= read -r line; do printf '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\\n'; done");
    let bridge = McpBridge::new(child, Duration::from_secs(5)).expect("bridge");

    let result = bridge.request("initialize", serde_json::json!({})).await.expect("request");
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn request_surfaces_rpc_error() {
    let child = spawn_sh("while IFS= read -r line; do printf '{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"message\":\"nope\"}}\\n'; done");
    let bridge = McpBridge::new(child, Duration::from_secs(5)).expect("bridge");

    match bridge.request("tools/call", serde_json::json!({})).await {
        Err(Error::RpcError(msg)) => assert_eq!(msg, "nope"),
        other => panic!("expected RpcError, got {other:?}"),
    }
}

#[tokio::test]
async fn request_fails_transport_closed_when_child_exits_first() {
    let child = spawn_sh("exit 0");
    let bridge = McpBridge::new(child, Duration::from_secs(5)).expect("bridge");

    match bridge.request("tools/call", serde_json::json!({})).await {
        Err(Error::TransportClosed(_)) => {}
        other => panic!("expected TransportClosed, got {other:?}"),
    }
}

#[tokio::test]
async fn request_times_out_when_no_response_arrives() {
    let child = spawn_sh("while IFS= read -r line; do :; done");
    let bridge = McpBridge::new(child, Duration::from_millis(50)).expect("bridge");

    match bridge.request("tools/call", serde_json::json!({})).await {
        Err(Error::Timeout(_)) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn frame_without_id_dispatches_to_notification_handler() {
    let child = spawn_sh("printf '{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{\"text\":\"hi\"}}\\n'; while IFS= read -r line; do :; done");
    let bridge = McpBridge::new(child, Duration::from_secs(5)).expect("bridge");

    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&received);
    bridge.set_notification_handler(Arc::new(move |frame| {
        captured.lock().unwrap_or_else(|e| e.into_inner()).push(frame);
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let received = received.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["method"], "notifications/message");
}

#[tokio::test]
async fn exit_handler_fires_with_exit_code() {
    let child = spawn_sh("exit 7");
    let bridge = McpBridge::new(child, Duration::from_secs(5)).expect("bridge");

    let code: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&code);
    bridge.set_exit_handler(Arc::new(move |c, _signal| {
        *captured.lock().unwrap_or_else(|e| e.into_inner()) = c;
    }));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(*code.lock().unwrap_or_else(|e| e.into_inner()), Some(7));
}

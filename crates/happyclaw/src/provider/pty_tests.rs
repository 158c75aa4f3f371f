// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use super::*;
use crate::model::MessageKind;

fn opts() -> SpawnOptions {
    SpawnOptions { cwd: "/tmp".into(), mode: Mode::Remote, owner_id: "alice".into(), resume_session_id: None }
}

fn shell(script: &str) -> CommandBuilder {
    let script = script.to_string();
    Arc::new(move |_id: &str, _opts: &SpawnOptions| vec!["sh".to_string(), "-c".to_string(), script.clone()])
}

#[tokio::test]
async fn spawn_streams_child_output_as_text_messages() {
    let provider = PtyProvider::new(shell("printf 'hello world\\n'; sleep 5"));
    let session = provider.spawn("p1", &opts()).await.expect("spawn");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let page = session.read(0, 50).expect("read");
    assert!(page.messages.iter().any(|m| m.kind == MessageKind::Text && m.content.contains("hello world")));

    session.stop(true).await.expect("stop");
}

#[tokio::test]
async fn send_writes_filtered_input_with_trailing_cr() {
    let script = r#"
IFS= read -r line
printf 'got: %s\n' "$line"
sleep 5
"#;
    let provider = PtyProvider::new(shell(script));
    let session = provider.spawn("p2", &opts()).await.expect("spawn");

    tokio::time::sleep(Duration::from_millis(150)).await;
    session.send("ping").await.expect("send");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let page = session.read(0, 50).expect("read");
    assert!(page.messages.iter().any(|m| m.content.contains("got: ping")));

    session.stop(true).await.expect("stop");
}

#[tokio::test]
async fn send_rejects_input_carrying_a_blocked_control_byte() {
    let provider = PtyProvider::new(shell("sleep 5"));
    let session = provider.spawn("p3", &opts()).await.expect("spawn");

    let result = session.send("hello\u{3}world").await;
    assert!(matches!(result, Err(Error::InputBlocked(_))));

    session.stop(true).await.expect("stop");
}

#[tokio::test]
async fn local_mode_rejects_send_and_read() {
    let provider = PtyProvider::new(shell("sleep 5"));
    let local_opts = SpawnOptions { mode: Mode::Local, ..opts() };
    let session = provider.spawn("p4", &local_opts).await.expect("spawn");

    assert!(matches!(session.send("hi").await, Err(Error::NotSupported(_))));
    assert!(matches!(session.read(0, 10), Err(Error::NotSupported(_))));
    assert!(matches!(session.respond_to_permission("x", PermissionOutcome::Allow).await, Err(Error::NotSupported(_))));

    session.stop(true).await.expect("stop");
}

#[tokio::test]
async fn stop_terminates_the_child_process() {
    let provider = PtyProvider::new(shell("sleep 30"));
    let session = provider.spawn("p5", &opts()).await.expect("spawn");
    let pid = session.pid().expect("pid");

    session.stop(false).await.expect("stop");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!crate::health::is_process_alive(pid));
}

#[tokio::test]
async fn permission_prompt_is_detected_and_respond_writes_y_or_n() {
    let script = r#"
printf 'Allow this action? [y/n] '
IFS= read -r reply
printf 'reply: %s\n' "$reply"
sleep 5
"#;
    let provider = PtyProvider::new(shell(script));
    let session = provider.spawn("p6", &opts()).await.expect("spawn");

    tokio::time::sleep(Duration::from_millis(250)).await;

    // The parser assigns a fresh request id per detected prompt; exercise the
    // provider's own mechanism by attempting a respond with a made-up id,
    // which must be rejected since it cannot match the real pending one.
    let result = session.respond_to_permission("not-the-real-id", PermissionOutcome::Allow).await;
    assert!(matches!(result, Err(Error::AlreadyResolved(_))));

    session.stop(true).await.expect("stop");
}

#[tokio::test]
async fn feed_lines_strips_ansi_before_classification() {
    let mut parser = PtyParser::new();
    let shared = Shared {
        id: "p7".into(),
        cwd: "/tmp".into(),
        mode: Mode::Remote,
        pid: None,
        buffer: MessageBuffer::new(),
        stopped: AtomicBool::new(false),
        event_handler: ListenerSlot::new(),
        message_handler: ListenerSlot::new(),
        pending_permission: StdMutex::new(None),
        screen: StdMutex::new(Screen::new(80, 24)),
    };
    let mut line_buf = String::new();

    feed_lines(&shared, &mut parser, &mut line_buf, b"\x1b[31merror: boom\x1b[0m\n");

    let page = shared.buffer.read(0, 10);
    assert!(page.messages.iter().any(|m| m.kind == MessageKind::Error && m.content.contains("error: boom")));
}

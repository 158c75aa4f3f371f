// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::*;
use crate::model::MessageKind;

#[test]
fn message_buffer_read_slices_forward_and_caps_at_len() {
    let buf = MessageBuffer::new();
    for i in 0..5 {
        buf.push(SessionMessage::new(MessageKind::Text, format!("line {i}")));
    }

    let page = buf.read(0, 2);
    assert_eq!(page.messages.len(), 2);
    assert_eq!(page.messages[0].content, "line 0");
    assert_eq!(page.next_cursor, 2);

    let page = buf.read(2, 100);
    assert_eq!(page.messages.len(), 3);
    assert_eq!(page.next_cursor, 5);

    let page = buf.read(10, 5);
    assert!(page.messages.is_empty());
    assert_eq!(page.next_cursor, 5);
}

#[test]
fn listener_slot_replaces_on_reregister() {
    let slot: ListenerSlot<dyn Fn(i32) + Send + Sync> = ListenerSlot::new();
    assert!(slot.get().is_none());

    slot.set(Arc::new(|_n: i32| {}));
    assert!(slot.get().is_some());
}

#[test]
fn reject_if_local_allows_remote_and_denies_local() {
    assert!(reject_if_local(Mode::Remote, "send").is_ok());
    match reject_if_local(Mode::Local, "send") {
        Err(Error::NotSupported(_)) => {}
        other => panic!("expected NotSupported, got {other:?}"),
    }
}

#[tokio::test]
async fn terminate_child_term_reaps_a_cooperative_child() {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("trap 'exit 0' TERM; while true; do sleep 1; done")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sh");
    let pid = child.id().expect("pid");

    terminate_child(pid, false).await.expect("terminate");
    let status = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
    assert!(status.is_ok(), "child should have exited after TERM");
}

#[tokio::test]
async fn terminate_child_force_kills_immediately() {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("trap '' TERM; while true; do sleep 1; done")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sh");
    let pid = child.id().expect("pid");

    terminate_child(pid, true).await.expect("terminate");
    let status = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
    assert!(status.is_ok(), "child should have been killed");
}

#[tokio::test]
async fn terminate_child_on_already_dead_pid_is_a_no_op() {
    terminate_child(u32::MAX, false).await.expect("terminate on dead pid should not fail");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn log_then_read_round_trips_newest_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logger = AuditLogger::new(dir.path());

    logger.log(&AuditEntry::new("alice", "session.spawn", Some("s1".into())));
    logger.log(&AuditEntry::new("alice", "session.stop", Some("s1".into())));

    let entries = logger.read(None, None);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "session.stop");
    assert_eq!(entries[1].action, "session.spawn");
}

#[test]
fn read_on_missing_file_returns_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logger = AuditLogger::new(dir.path());
    assert!(logger.read(None, None).is_empty());
}

#[test]
fn malformed_lines_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path()).expect("mkdir");
    let logger = AuditLogger::new(dir.path());

    logger.log(&AuditEntry::new("alice", "session.spawn", Some("s1".into())));
    std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("audit.log"))
        .and_then(|mut f| std::io::Write::write_all(&mut f, b"not json at all\n"))
        .expect("append garbage");
    logger.log(&AuditEntry::new("alice", "session.stop", Some("s1".into())));

    let entries = logger.read(None, None);
    assert_eq!(entries.len(), 2);
}

#[test]
fn respects_since_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logger = AuditLogger::new(dir.path());

    let mut e1 = AuditEntry::new("alice", "first", None);
    e1.timestamp = 100;
    let mut e2 = AuditEntry::new("alice", "second", None);
    e2.timestamp = 200;
    let mut e3 = AuditEntry::new("alice", "third", None);
    e3.timestamp = 300;

    logger.log(&e1);
    logger.log(&e2);
    logger.log(&e3);

    let recent = logger.read(Some(200), None);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].action, "third");
    assert_eq!(recent[1].action, "second");

    let limited = logger.read(None, Some(1));
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].action, "third");
}

use super::*;

#[test]
fn intercept_strips_literal_escape() {
    let result = intercept("!/clear");
    assert!(result.literal);
    assert_eq!(result.content, "/clear");
}

#[test]
fn intercept_passes_through_without_escape() {
    let result = intercept("/clear");
    assert!(!result.literal);
    assert_eq!(result.content, "/clear");
}

#[test]
fn intercept_only_strips_one_leading_bang() {
    let result = intercept("!!urgent");
    assert!(result.literal);
    assert_eq!(result.content, "!urgent");
}

#[test]
fn summarize_empty_buffer() {
    let summary = summarize(&[]);
    assert_eq!(summary, MessageSummary::default());
}

#[test]
fn summarize_counts_and_bytes() {
    let messages = vec![
        msg(MessageKind::Text, "hello", 100),
        msg(MessageKind::Text, "world!", 150),
        msg(MessageKind::Error, "boom", 300),
    ];
    let summary = summarize(&messages);
    assert_eq!(summary.counts.get(&MessageKind::Text), Some(&2));
    assert_eq!(summary.counts.get(&MessageKind::Error), Some(&1));
    assert_eq!(summary.total_bytes, "hello".len() + "world!".len() + "boom".len());
    assert_eq!(summary.elapsed_ms, 200);
}

#[test]
fn summarize_single_message_has_zero_elapsed() {
    let summary = summarize(&[msg(MessageKind::Text, "hi", 42)]);
    assert_eq!(summary.elapsed_ms, 0);
}

fn msg(kind: MessageKind, content: &str, timestamp: u64) -> SessionMessage {
    SessionMessage { kind, content: content.to_string(), timestamp, metadata: HashMap::new() }
}

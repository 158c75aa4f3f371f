// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trivial pre-filter on outbound `send` text, and a post-hoc summary pass
//! over a session's message buffer.
//!
//! Slash-command *semantics* (`/clear`, `/compact`, `/cost`) belong to the
//! host plugin layer; the only interception this layer owns is a literal
//! escape so a caller can force text past that layer unparsed.

use std::collections::HashMap;

use crate::model::{MessageKind, SessionMessage};

/// A leading `!` means "send literally" — skip any higher-level slash-command
/// parsing the host may apply to the text that follows.
const LITERAL_ESCAPE: char = '!';

/// The outcome of running [`intercept`] on one `send(input)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedInput<'a> {
    /// The text to actually deliver to the provider, escape stripped.
    pub content: &'a str,
    /// Whether the caller asked to bypass higher-level command parsing.
    pub literal: bool,
}

/// Strip a leading literal-escape prefix, if present. Does not otherwise
/// interpret the text — slash-command parsing is the host's concern.
pub fn intercept(input: &str) -> InterceptedInput<'_> {
    match input.strip_prefix(LITERAL_ESCAPE) {
        Some(rest) => InterceptedInput { content: rest, literal: true },
        None => InterceptedInput { content: input, literal: false },
    }
}

/// Per-kind counts, total content bytes, and elapsed wall time between the
/// first and last message in a buffer slice. A pure read-side aggregation;
/// it has no effect on stored state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageSummary {
    pub counts: HashMap<MessageKind, usize>,
    pub total_bytes: usize,
    pub elapsed_ms: u64,
}

/// Summarize a slice of messages, in insertion order.
pub fn summarize(messages: &[SessionMessage]) -> MessageSummary {
    let mut summary = MessageSummary::default();
    if messages.is_empty() {
        return summary;
    }

    let mut first = messages[0].timestamp;
    let mut last = messages[0].timestamp;
    for message in messages {
        *summary.counts.entry(message.kind).or_insert(0) += 1;
        summary.total_bytes += message.content.len();
        first = first.min(message.timestamp);
        last = last.max(message.timestamp);
    }
    summary.elapsed_ms = last.saturating_sub(first);
    summary
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

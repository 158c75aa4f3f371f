// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heuristic rule set that recovers structure from a PTY-driven child's
//! ANSI-stripped line stream: message classification, permission/error/
//! input-ready event detection, and an input-safety filter.

use uuid::Uuid;

use crate::model::{EventKind, MessageKind, SessionEvent, SessionMessage, Severity};

/// Control bytes `filter_input` rejects: Ctrl-C, Ctrl-D, Ctrl-Z, ESC (which
/// also covers CSI sequences, since every CSI sequence opens with ESC).
const BLOCKED_BYTES: [u8; 4] = [0x03, 0x04, 0x1A, 0x1B];

/// Stateful line classifier for one PTY session. Holds the in-progress code
/// fence (if any) across calls to `parse`.
#[derive(Debug, Default)]
pub struct PtyParser {
    fence: Option<FenceState>,
}

#[derive(Debug)]
struct FenceState {
    language: Option<String>,
    lines: Vec<String>,
}

impl PtyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one clean (ANSI-stripped) line. Precedence: code-fence state
    /// machine first, then prefix/keyword rules. Empty/whitespace-only lines
    /// outside a fence produce nothing.
    pub fn parse(&mut self, line: &str) -> Option<SessionMessage> {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("```") {
            return match self.fence.take() {
                Some(state) => {
                    let content = state.lines.join("\n");
                    let mut msg = SessionMessage::new(MessageKind::Code, content);
                    if let Some(language) = state.language {
                        msg = msg.with_meta("language", language);
                    }
                    Some(msg)
                }
                None => {
                    let language = rest.trim();
                    self.fence = Some(FenceState {
                        language: if language.is_empty() { None } else { Some(language.to_string()) },
                        lines: Vec::new(),
                    });
                    None
                }
            };
        }

        if let Some(state) = self.fence.as_mut() {
            state.lines.push(line.to_string());
            return None;
        }

        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with("Using tool:") || trimmed.starts_with("Running:") {
            return Some(SessionMessage::new(MessageKind::ToolUse, line));
        }
        if trimmed.starts_with("Tool result:") {
            return Some(SessionMessage::new(MessageKind::ToolResult, line));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("error:") || lower.starts_with("failed:") {
            return Some(SessionMessage::new(MessageKind::Error, line));
        }
        if is_thinking_line(trimmed) {
            return Some(SessionMessage::new(MessageKind::Thinking, line));
        }

        Some(SessionMessage::new(MessageKind::Text, line))
    }

    /// Scan one line for a permission prompt, an error, or an input-ready
    /// marker. Best-effort: the PTY parser has no ground truth, only text
    /// patterns. Permission events carry a freshly generated request id.
    pub fn detect_event(&self, line: &str, session_id: &str) -> Option<SessionEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();

        if lower.contains("allow?") || lower.contains("[y/n]") || lower.contains("[yes/no]") {
            let request_id = Uuid::new_v4().to_string();
            return Some(SessionEvent::permission_request(session_id, request_id, "unknown", serde_json::json!({"line": line})));
        }

        if lower.starts_with("error:") || lower.starts_with("failed:") {
            let mut ev = SessionEvent::new(EventKind::Error, Severity::Warning, session_id, trimmed);
            ev.summary = trimmed.to_string();
            return Some(ev);
        }

        if is_input_ready_marker(line) {
            return Some(SessionEvent::new(EventKind::WaitingForInput, Severity::Info, session_id, "waiting for input"));
        }

        None
    }

    /// Reject any input containing a byte in the control-character
    /// block-set. Returns `None` on rejection.
    pub fn filter_input(input: &str) -> Option<&str> {
        if input.bytes().any(|b| BLOCKED_BYTES.contains(&b)) {
            None
        } else {
            Some(input)
        }
    }
}

fn is_thinking_line(trimmed: &str) -> bool {
    let ends_with_ellipsis = trimmed.ends_with('\u{2026}') || trimmed.ends_with("...");
    ends_with_ellipsis && (trimmed.starts_with("Thinking") || trimmed.starts_with("Analyzing"))
}

fn is_input_ready_marker(line: &str) -> bool {
    let end = line.trim_end_matches('\r');
    end.ends_with("> ") || end.ends_with(">>> ")
}

#[cfg(test)]
#[path = "pty_parser_tests.rs"]
mod tests;

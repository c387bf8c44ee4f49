//! C11 (parser half) — in-band policy override parsed from the first user
//! message. An output-shaper and a JSON-schema sanity checker are named
//! seams alongside this parser but have no implementation here — their
//! behavior isn't pinned down anywhere this crate can ground it.

use crate::models::{Message, Mode, Role};

const MARKER: &str = "@@tokenhub";
const END_MARKER: &str = "@@end";
const SCAN_WINDOW: usize = 2048;

/// Recognized in-band overrides. Unrecognized keys are silently ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveOverride {
    pub mode: Option<Mode>,
    pub budget: Option<f64>,
    pub latency: Option<u64>,
    pub min_weight: Option<i64>,
}

/// Parses the first user message's directive span, if any. System and
/// assistant messages are never scanned.
pub fn parse_directives(messages: &[Message]) -> DirectiveOverride {
    let Some(first_user) = messages.iter().find(|m| m.role == Role::User) else {
        return DirectiveOverride::default();
    };
    match find_span(&first_user.content) {
        Some(span) => parse_kv(&span.body),
        None => DirectiveOverride::default(),
    }
}

/// Removes the matched directive span from the first user message, leaving
/// every other message untouched.
pub fn strip_directives(messages: &[Message]) -> Vec<Message> {
    let mut found_user = false;
    messages
        .iter()
        .map(|m| {
            if m.role == Role::User && !found_user {
                found_user = true;
                if let Some(span) = find_span(&m.content) {
                    let mut stripped = String::with_capacity(m.content.len());
                    stripped.push_str(&m.content[..span.start]);
                    stripped.push_str(&m.content[span.end..]);
                    return Message {
                        role: m.role,
                        content: stripped,
                    };
                }
            }
            m.clone()
        })
        .collect()
}

struct Span {
    start: usize,
    end: usize,
    body: String,
}

fn find_span(content: &str) -> Option<Span> {
    let boundary = floor_char_boundary(content, SCAN_WINDOW.min(content.len()));
    let window = &content[..boundary];
    let marker_at = window.find(MARKER)?;

    let after = &content[marker_at + MARKER.len()..];

    // Block form: "@@tokenhub" is immediately followed by a newline (modulo
    // trailing horizontal whitespace on that line).
    let rest_of_marker_line_end = after.find('\n');
    let is_block = match rest_of_marker_line_end {
        Some(nl) => after[..nl].trim().is_empty(),
        None => false,
    };

    if is_block {
        let block_search_limit = boundary.saturating_sub(marker_at + MARKER.len());
        let searchable = &after[..block_search_limit.min(after.len())];
        let end_marker_pos = searchable.find(END_MARKER)?;
        let body_start = rest_of_marker_line_end.unwrap() + 1;
        if end_marker_pos < body_start {
            return None;
        }
        let body = after[body_start..end_marker_pos].to_string();
        let mut span_end = marker_at + MARKER.len() + end_marker_pos + END_MARKER.len();
        // Consume one trailing newline after @@end.
        if content[span_end..].starts_with('\n') {
            span_end += 1;
        }
        Some(Span {
            start: marker_at,
            end: span_end,
            body,
        })
    } else {
        let line_end = after.find('\n');
        let body = match line_end {
            Some(nl) => after[..nl].to_string(),
            None => after.to_string(),
        };
        let mut span_end = marker_at + MARKER.len() + body.len();
        if content[span_end..].starts_with('\n') {
            span_end += 1;
        }
        Some(Span {
            start: marker_at,
            end: span_end,
            body,
        })
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn parse_kv(body: &str) -> DirectiveOverride {
    let mut override_ = DirectiveOverride::default();
    for token in body.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "mode" => override_.mode = parse_mode(value),
            "budget" => override_.budget = value.parse().ok(),
            "latency" => override_.latency = value.parse().ok(),
            "min_weight" => override_.min_weight = value.parse().ok(),
            _ => {}
        }
    }
    override_
}

fn parse_mode(value: &str) -> Option<Mode> {
    match value {
        "normal" => Some(Mode::Normal),
        "cheap" => Some(Mode::Cheap),
        "high_confidence" => Some(Mode::HighConfidence),
        "planning" => Some(Mode::Planning),
        "adversarial" => Some(Mode::Adversarial),
        "thompson" => Some(Mode::Thompson),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_round_trip_single_line() {
        let messages = vec![Message::user("@@tokenhub mode=cheap budget=0.01 latency=5000\nHello")];
        let parsed = parse_directives(&messages);
        assert_eq!(parsed.mode, Some(Mode::Cheap));
        assert_eq!(parsed.budget, Some(0.01));
        assert_eq!(parsed.latency, Some(5000));

        let stripped = strip_directives(&messages);
        assert_eq!(stripped[0].content, "Hello");
    }

    #[test]
    fn block_form_round_trip() {
        let messages = vec![Message::user(
            "@@tokenhub\nmode=high_confidence\nmin_weight=7\n@@end\nActual question",
        )];
        let parsed = parse_directives(&messages);
        assert_eq!(parsed.mode, Some(Mode::HighConfidence));
        assert_eq!(parsed.min_weight, Some(7));

        let stripped = strip_directives(&messages);
        assert_eq!(stripped[0].content, "Actual question");
    }

    #[test]
    fn malformed_block_without_end_marker_is_dropped() {
        let messages = vec![Message::user("@@tokenhub\nmode=cheap\nno terminator here")];
        let parsed = parse_directives(&messages);
        assert_eq!(parsed, DirectiveOverride::default());
        let stripped = strip_directives(&messages);
        assert_eq!(stripped[0].content, messages[0].content);
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let messages = vec![Message::user("@@tokenhub foo=bar mode=cheap\nHi")];
        let parsed = parse_directives(&messages);
        assert_eq!(parsed.mode, Some(Mode::Cheap));
    }

    #[test]
    fn system_and_assistant_messages_are_never_scanned() {
        let messages = vec![
            Message::system("@@tokenhub mode=cheap\n"),
            Message::user("no directive here"),
        ];
        let parsed = parse_directives(&messages);
        assert_eq!(parsed, DirectiveOverride::default());
        let stripped = strip_directives(&messages);
        assert_eq!(stripped[0].content, messages[0].content);
    }

    #[test]
    fn no_directive_present_leaves_messages_unchanged() {
        let messages = vec![Message::user("just a normal question")];
        let stripped = strip_directives(&messages);
        assert_eq!(stripped[0].content, messages[0].content);
    }
}

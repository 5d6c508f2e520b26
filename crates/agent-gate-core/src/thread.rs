// crates/agent-gate-core/src/thread.rs
// ============================================================================
// Module: Thread Context Stripping
// Description: Quoted-reply removal for latest-only email context.
// Purpose: Truncate message text at the first quoted-history marker.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! In `latest_only` context mode the proxy returns only the newest content
//! of a message. Stripping is heuristic: lines are scanned top to bottom
//! and the text is truncated at the first line that looks like quoted
//! history — a `>` quote prefix, an `On ... wrote:` attribution, forwarded
//! or original-message separators, or reply-header fragments.

use std::sync::LazyLock;

use regex::Regex;

/// Markers that begin quoted or forwarded history.
static QUOTE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*>",
        r"(?i)^on .+ wrote:\s*$",
        r"(?i)^(from|sent|subject|to):\s",
        r"(?i)^-{2,}\s*original message\s*-{2,}\s*$",
        r"(?i)^begin forwarded message:",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("quote marker pattern"))
    .collect()
});

/// Strips quoted-reply history from message text.
///
/// Returns the text up to (not including) the first marker line, trimmed
/// of trailing whitespace. Text without markers is returned unchanged.
#[must_use]
pub fn strip_quoted_context(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        if QUOTE_MARKERS.iter().any(|marker| marker.is_match(line)) {
            break;
        }
        kept.push(line);
    }
    kept.join("\n").trim_end().to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::strip_quoted_context;

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(strip_quoted_context("see you at 3pm"), "see you at 3pm");
    }

    #[test]
    fn truncates_at_quote_prefix() {
        let text = "sounds good\n\n> earlier message\n> more quoting";
        assert_eq!(strip_quoted_context(text), "sounds good");
    }

    #[test]
    fn truncates_at_wrote_attribution() {
        let text = "thanks!\nOn Tue, Mar 3, 2026 at 9:00 AM Alice <a@example.com> wrote:\n> hi";
        assert_eq!(strip_quoted_context(text), "thanks!");
    }

    #[test]
    fn truncates_at_reply_headers() {
        let text = "done\nFrom: Bob <bob@example.com>\nSent: Monday\nbody";
        assert_eq!(strip_quoted_context(text), "done");
    }

    #[test]
    fn truncates_at_original_message_separator() {
        let text = "ack\n-- Original Message --\nold";
        assert_eq!(strip_quoted_context(text), "ack");
    }

    #[test]
    fn truncates_at_forwarded_marker() {
        let text = "fyi\nBegin forwarded message:\nold";
        assert_eq!(strip_quoted_context(text), "fyi");
    }

    #[test]
    fn keeps_inline_angle_brackets() {
        let text = "the operator a > b holds here";
        assert_eq!(strip_quoted_context(text), text);
    }
}

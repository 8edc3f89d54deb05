//! Logging utilities for keeping plugin and data-source error text on a
//! single log line. Control characters are escaped and very long strings are
//! truncated so telemetry-adjacent logs stay readable.

/// Escape a string for single-line logging.
///
/// Newlines, carriage returns and tabs become their two-character escape
/// sequences, other control characters are rendered as `\xNN`, and output is
/// capped at `LOG_PREVIEW_CHARS` characters with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const LOG_PREVIEW_CHARS: usize = 240;
    let mut out = String::with_capacity(s.len().min(LOG_PREVIEW_CHARS) + 4);
    for (seen, ch) in s.chars().enumerate() {
        if seen >= LOG_PREVIEW_CHARS {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_log;

    #[test]
    fn escapes_newlines() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
    }

    #[test]
    fn truncates_long_input() {
        let long = "x".repeat(1000);
        let escaped = escape_log(&long);
        assert!(escaped.chars().count() <= 241);
        assert!(escaped.ends_with('…'));
    }

    #[test]
    fn escapes_control_chars_as_hex() {
        assert_eq!(escape_log("a\u{1}b"), "a\\x01b");
    }
}

//! Client-visible description sanitation.
//!
//! Every description that leaves the process goes through [`sanitize_description`]:
//! runs of base-64 looking characters of 80 or more are replaced by
//! `[REDACTED]`, then the text is cut to the configured number of characters.

use serde_json::Value;

use crate::errors::codes::SYSTEM_FAULT_DESC;

/// Default maximum length, in characters.
pub const DEFAULT_MAX_DESCRIPTION_LEN: usize = 512;

/// Minimum length of a base-64 run that gets redacted.
pub const REDACT_MIN_RUN: usize = 80;

const REDACTED: &str = "[REDACTED]";

/// Sanitize a candidate description. Non-string values collapse to `SYSTEM_FAULT_DESC`.
pub fn sanitize_description(candidate: &Value, max_len: usize) -> String {
    match candidate {
        Value::String(text) => sanitize_text(text, max_len),
        _ => SYSTEM_FAULT_DESC.to_string(),
    }
}

/// Redact then truncate a plain string.
pub fn sanitize_text(text: &str, max_len: usize) -> String {
    truncate(&redact_base64(text), max_len)
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
}

fn redact_base64(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    for c in text.chars() {
        if is_base64_char(c) {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(c);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.chars().count() >= REDACT_MIN_RUN {
        out.push_str(REDACTED);
    } else {
        out.push_str(run);
    }
    run.clear();
}

fn truncate(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(sanitize_text("plain message", 512), "plain message");
    }

    #[test]
    fn test_long_base64_run_redacted() {
        let blob = "QUJD".repeat(30);
        let text = format!("token: {} end", blob);
        let cleaned = sanitize_text(&text, 512);
        assert_eq!(cleaned, "token: [REDACTED] end");
    }

    #[test]
    fn test_run_just_below_threshold_kept() {
        let blob = "a".repeat(REDACT_MIN_RUN - 1);
        assert_eq!(sanitize_text(&blob, 512), blob);
    }

    #[test]
    fn test_truncates_by_characters() {
        let text = "é ".repeat(600);
        let cleaned = sanitize_text(&text, 512);
        assert_eq!(cleaned.chars().count(), 512);
    }

    #[test]
    fn test_non_string_collapses() {
        assert_eq!(sanitize_description(&json!({"a": 1}), 512), SYSTEM_FAULT_DESC);
        assert_eq!(sanitize_description(&json!(12), 512), SYSTEM_FAULT_DESC);
    }
}

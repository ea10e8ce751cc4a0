//! Content sanitization and the request-level threat scan.
//!
//! Sanitization runs BEFORE channel escaping: trim, strip control characters
//! (newlines and tabs survive in message bodies, nothing survives in header
//! values), and enforce the per-channel length cap by truncation on a char
//! boundary. All inputs arrive as Rust `String`s so UTF-8 validity is already
//! guaranteed at the serde boundary.
//!
//! The threat scan runs once per request, before any adapter is invoked, and
//! rejects with `SECURITY_THREAT_DETECTED`.

/// Webhook body cap (chars).
pub const MAX_WEBHOOK_CONTENT: usize = 100_000;

/// Telegram `text` cap (chars).
pub const MAX_TELEGRAM_TEXT: usize = 4096;

/// Control characters tolerated in a message body before the scan calls it
/// hostile. Legitimate text has a handful at most.
const CONTROL_CHAR_THREAT_THRESHOLD: usize = 16;

/// Lowercased substrings that mark script-injection attempts.
const INJECTION_PATTERNS: [&str; 6] = [
    "<script",
    "javascript:",
    "vbscript:",
    "onerror=",
    "onload=",
    "data:text/html",
];

/// Clean a message body: trim, drop control chars except `\n`/`\t`, cap length.
pub fn clean_text(input: &str, max_chars: usize) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    truncate_chars(&cleaned, max_chars)
}

/// Clean a header value: no control characters at all (CR/LF smuggling).
pub fn clean_header_value(input: &str) -> String {
    input.trim().chars().filter(|c| !c.is_control()).collect()
}

/// Truncate to at most `max_chars` chars without splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_owned();
    }
    input.chars().take(max_chars).collect()
}

/// Scan one text for threats. Returns a description of the first hit.
pub fn scan_text(input: &str) -> Option<String> {
    if input.contains('\0') {
        return Some("null byte in content".to_owned());
    }

    let control_count = input
        .chars()
        .filter(|c| c.is_control() && *c != '\n' && *c != '\t' && *c != '\r')
        .count();
    if control_count > CONTROL_CHAR_THREAT_THRESHOLD {
        return Some(format!("excessive control characters ({control_count})"));
    }

    let lowered = input.to_lowercase();
    for pattern in INJECTION_PATTERNS {
        if lowered.contains(pattern) {
            return Some(format!("script injection pattern '{pattern}'"));
        }
    }
    None
}

/// Scan every text field of a send request: subject, content, and all
/// variable values.
pub fn scan_request(
    subject: Option<&str>,
    content: Option<&str>,
    variables: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Option<String> {
    if let Some(s) = subject {
        if let Some(threat) = scan_text(s) {
            return Some(threat);
        }
    }
    if let Some(c) = content {
        if let Some(threat) = scan_text(c) {
            return Some(threat);
        }
    }
    if let Some(vars) = variables {
        for value in vars.values() {
            if let Some(s) = value.as_str() {
                if let Some(threat) = scan_text(s) {
                    return Some(threat);
                }
            }
        }
    }
    None
}

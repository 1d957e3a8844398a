// Helpers that keep secrets and oversized payloads out of log lines and error messages.

/// Placeholder for secret text: only the length survives.
pub fn redact_body(s: &str) -> String {
    format!("<redacted len={}>", s.len())
}

/// Cuts a (non-secret) remote response body down to `max` characters for an error message.
pub fn truncate_for_log(body: &str, max: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max) {
        Some((cut, _)) => format!("{}... ({} bytes)", &body[..cut], body.len()),
        None => body.to_string(),
    }
}

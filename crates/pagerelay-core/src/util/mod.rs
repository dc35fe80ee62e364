pub mod http;

/// Show whether a secret is configured without revealing it.
pub fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        "not set"
    } else {
        "✓"
    }
}

/// Truncate a string to max length, adding suffix if truncated.
pub fn truncate_string(s: &str, max_len: usize, suffix: &str) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(suffix.len());
    // Ensure we don't split a multi-byte UTF-8 character
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}
